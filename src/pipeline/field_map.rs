//! Static tables mapping start-request fields onto template node properties.
//!
//! Three tables drive materialization:
//!
//! - `graphs`: request language → graph name, used when a request does not
//!   name its graph explicitly.
//! - `fields`: logical request field → one or more `(node, property)` targets.
//! - `voices`: `language → node → voice type → vendor voice id`, the
//!   secondary indirection applied to [`StartField::VoiceType`].
//!
//! A fourth table, `env_properties`, patches every graph at startup from
//! process environment variables.
//!
//! Field iteration order follows `HashMap` order. When two fields target the
//! same `(node, property)` pair the last one applied wins, and that order
//! is unspecified.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Logical fields of a start request that may be written into a graph.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StartField {
    /// Channel the worker joins.
    ChannelName,
    /// Remote media stream the worker subscribes to.
    RemoteStreamId,
    /// Subscriber token for the channel.
    Token,
    /// Callback port the worker listens on.
    WorkerHttpServerPort,
    /// Speech recognition language.
    AsrLanguage,
    /// Requested voice type; resolved through the voice table.
    VoiceType,
    /// System prompt for the language model stage.
    Prompt,
}

impl StartField {
    /// Every field, for table construction and validation.
    pub const ALL: [Self; 7] = [
        Self::ChannelName,
        Self::RemoteStreamId,
        Self::Token,
        Self::WorkerHttpServerPort,
        Self::AsrLanguage,
        Self::VoiceType,
        Self::Prompt,
    ];

    /// Configuration key of the field.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChannelName => "channel_name",
            Self::RemoteStreamId => "remote_stream_id",
            Self::Token => "token",
            Self::WorkerHttpServerPort => "worker_http_server_port",
            Self::AsrLanguage => "asr_language",
            Self::VoiceType => "voice_type",
            Self::Prompt => "prompt",
        }
    }
}

impl Display for StartField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StartField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| format!("unknown start field `{s}`"))
    }
}

/// A single `(node, property)` destination inside a graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PropertyTarget {
    /// Node (extension) name.
    pub node: String,
    /// Property key within the node.
    pub property: String,
}

impl PropertyTarget {
    /// Construct a target from borrowed names.
    #[must_use]
    pub fn new(node: &str, property: &str) -> Self {
        Self {
            node: node.to_owned(),
            property: property.to_owned(),
        }
    }
}

/// `language → node → voice type → vendor voice id`.
pub type VoiceTable = HashMap<String, HashMap<String, HashMap<String, String>>>;

/// Graph selection and property mapping tables.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "snake_case")]
pub struct FieldMap {
    /// Language → graph name.
    pub graphs: HashMap<String, String>,
    /// Request field → property targets.
    #[serde(deserialize_with = "deserialize_fields")]
    pub fields: HashMap<StartField, Vec<PropertyTarget>>,
    /// Voice type indirection.
    pub voices: VoiceTable,
    /// Environment variable → property targets applied at startup.
    pub env_properties: HashMap<String, Vec<PropertyTarget>>,
}

/// Deserialize the field table keyed by configuration field names.
fn deserialize_fields<'de, D>(
    deserializer: D,
) -> std::result::Result<HashMap<StartField, Vec<PropertyTarget>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = HashMap::<String, Vec<PropertyTarget>>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, targets)| {
            key.parse::<StartField>()
                .map(|field| (field, targets))
                .map_err(serde::de::Error::custom)
        })
        .collect()
}

impl FieldMap {
    /// Graph configured for a request language.
    #[must_use]
    pub fn graph_for_language(&self, language: &str) -> Option<&str> {
        self.graphs.get(language).map(String::as_str)
    }

    /// Property targets of a request field; empty when unmapped.
    #[must_use]
    pub fn targets(&self, field: StartField) -> &[PropertyTarget] {
        self.fields.get(&field).map_or(&[], Vec::as_slice)
    }

    /// Resolve a requested voice type to the vendor voice id for one node.
    #[must_use]
    pub fn resolve_voice(&self, language: &str, node: &str, voice_type: &str) -> Option<&str> {
        self.voices
            .get(language)?
            .get(node)?
            .get(voice_type)
            .map(String::as_str)
    }
}

fn targets(pairs: &[(&str, &str)]) -> Vec<PropertyTarget> {
    pairs
        .iter()
        .map(|(node, property)| PropertyTarget::new(node, property))
        .collect()
}

fn voices(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(kind, id)| ((*kind).to_owned(), (*id).to_owned()))
        .collect()
}

impl Default for FieldMap {
    fn default() -> Self {
        let graphs = HashMap::from([
            ("en-US".to_owned(), "va.openai.azure".to_owned()),
            ("zh-CN".to_owned(), "va.qwen.cosy".to_owned()),
        ]);

        let fields = HashMap::from([
            (StartField::ChannelName, targets(&[("agora_rtc", "channel")])),
            (
                StartField::RemoteStreamId,
                targets(&[("agora_rtc", "remote_stream_id")]),
            ),
            (StartField::Token, targets(&[("agora_rtc", "token")])),
            (
                StartField::WorkerHttpServerPort,
                targets(&[("http_server", "listen_port")]),
            ),
            (
                StartField::AsrLanguage,
                targets(&[("agora_rtc", "agora_asr_language")]),
            ),
            (
                StartField::VoiceType,
                targets(&[
                    ("azure_tts", "azure_synthesis_voice_name"),
                    ("elevenlabs_tts", "voice_id"),
                    ("cosy_tts", "voice"),
                ]),
            ),
            (StartField::Prompt, targets(&[("openai_chatgpt", "prompt")])),
        ]);

        let voice_table = HashMap::from([
            (
                "en-US".to_owned(),
                HashMap::from([
                    (
                        "azure_tts".to_owned(),
                        voices(&[("male", "en-US-BrianNeural"), ("female", "en-US-JaneNeural")]),
                    ),
                    (
                        "elevenlabs_tts".to_owned(),
                        voices(&[
                            ("male", "pNInz6obpgDQGcFmaJgB"),
                            ("female", "Xb7hH8MSUJpSbSDYk0k2"),
                        ]),
                    ),
                ]),
            ),
            (
                "zh-CN".to_owned(),
                HashMap::from([
                    (
                        "azure_tts".to_owned(),
                        voices(&[
                            ("male", "zh-CN-YunxiNeural"),
                            ("female", "zh-CN-XiaoxiaoNeural"),
                        ]),
                    ),
                    (
                        "cosy_tts".to_owned(),
                        voices(&[("male", "longcheng"), ("female", "longwan")]),
                    ),
                ]),
            ),
        ]);

        let env_properties = HashMap::from([
            ("AGORA_APP_ID".to_owned(), targets(&[("agora_rtc", "app_id")])),
            (
                "AZURE_STT_KEY".to_owned(),
                targets(&[("agora_rtc", "agora_asr_vendor_key")]),
            ),
            (
                "AZURE_STT_REGION".to_owned(),
                targets(&[("agora_rtc", "agora_asr_vendor_region")]),
            ),
            (
                "AZURE_TTS_KEY".to_owned(),
                targets(&[("azure_tts", "azure_subscription_key")]),
            ),
            (
                "AZURE_TTS_REGION".to_owned(),
                targets(&[("azure_tts", "azure_subscription_region")]),
            ),
            (
                "ELEVENLABS_TTS_KEY".to_owned(),
                targets(&[("elevenlabs_tts", "api_key")]),
            ),
            (
                "OPENAI_API_KEY".to_owned(),
                targets(&[("openai_chatgpt", "api_key")]),
            ),
            (
                "OPENAI_API_BASE".to_owned(),
                targets(&[("openai_chatgpt", "base_url")]),
            ),
            (
                "OPENAI_MODEL".to_owned(),
                targets(&[("openai_chatgpt", "model")]),
            ),
            (
                "QWEN_API_KEY".to_owned(),
                targets(&[("qwen_llm", "api_key"), ("cosy_tts", "api_key")]),
            ),
        ]);

        Self {
            graphs,
            fields,
            voices: voice_table,
            env_properties,
        }
    }
}
