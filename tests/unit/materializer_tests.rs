use std::collections::HashMap;
use std::sync::Arc;

use graph_conductor::models::request::StartRequest;
use graph_conductor::pipeline::field_map::{FieldMap, PropertyTarget, StartField};
use graph_conductor::pipeline::materializer::Materializer;
use graph_conductor::pipeline::template::{PropertyDocument, TemplateStore};
use graph_conductor::AppError;
use serde_json::json;

const TEMPLATE: &str = r#"{
  "rte": {
    "predefined_graphs": [
      {
        "name": "va.openai.azure",
        "nodes": [
          { "name": "agora_rtc", "property": { "channel": "", "remote_stream_id": 0, "token": "" } },
          { "name": "http_server", "property": { "listen_port": 8080 } },
          { "name": "azure_tts", "property": { "azure_synthesis_voice_name": "en-US-Default" } },
          { "name": "openai_chatgpt", "property": { "prompt": "default prompt" } }
        ]
      },
      {
        "name": "va.qwen.cosy",
        "nodes": [
          { "name": "agora_rtc", "property": { "channel": "" } },
          { "name": "cosy_tts", "property": { "voice": "longxiaochun" } }
        ]
      }
    ]
  }
}"#;

fn materializer_with(field_map: FieldMap, work_dir: &std::path::Path) -> Materializer {
    let document = PropertyDocument::from_json_str(TEMPLATE).expect("template");
    Materializer::new(
        Arc::new(TemplateStore::new(document)),
        Arc::new(field_map),
        work_dir.to_path_buf(),
    )
}

fn materializer() -> Materializer {
    materializer_with(FieldMap::default(), std::path::Path::new("/unused"))
}

fn request(channel: &str, language: &str) -> StartRequest {
    StartRequest {
        asr_language: language.into(),
        ..StartRequest::for_channel(channel)
    }
}

#[test]
fn graph_is_selected_by_language_or_explicit_name() {
    let m = materializer();

    assert_eq!(m.select_graph(&request("a", "en-US")).ok().as_deref(), Some("va.openai.azure"));
    assert_eq!(m.select_graph(&request("a", "zh-CN")).ok().as_deref(), Some("va.qwen.cosy"));

    let mut explicit = request("a", "en-US");
    explicit.graph_name = "va.qwen.cosy".into();
    assert_eq!(m.select_graph(&explicit).ok().as_deref(), Some("va.qwen.cosy"));

    assert!(matches!(
        m.select_graph(&request("a", "de-DE")),
        Err(AppError::GraphNotFound(_))
    ));
}

#[test]
fn render_patches_mapped_fields_and_enables_only_the_selected_graph() {
    let m = materializer();
    let mut req = request("room-7", "en-US");
    req.remote_stream_id = 1234;
    req.token = "tok".into();
    req.worker_http_server_port = 10042;
    req.prompt = "be brief".into();

    let (graph_name, doc) = m.render(&req).expect("render");

    assert_eq!(graph_name, "va.openai.azure");
    let graph = doc.graph(&graph_name).expect("graph");
    assert!(graph.auto_start);
    assert_eq!(graph.property("agora_rtc", "channel"), Some(&json!("room-7")));
    assert_eq!(graph.property("agora_rtc", "remote_stream_id"), Some(&json!(1234)));
    assert_eq!(graph.property("agora_rtc", "token"), Some(&json!("tok")));
    assert_eq!(graph.property("http_server", "listen_port"), Some(&json!(10042)));
    assert_eq!(graph.property("openai_chatgpt", "prompt"), Some(&json!("be brief")));

    let other = doc.graph("va.qwen.cosy").expect("graph");
    assert!(!other.auto_start);
    assert_eq!(other.property("agora_rtc", "channel"), Some(&json!("")));
}

#[test]
fn empty_fields_leave_template_values() {
    let m = materializer();
    let (_, doc) = m.render(&request("room", "en-US")).expect("render");
    let graph = doc.graph("va.openai.azure").expect("graph");

    assert_eq!(graph.property("openai_chatgpt", "prompt"), Some(&json!("default prompt")));
    assert_eq!(graph.property("http_server", "listen_port"), Some(&json!(8080)));
    assert_eq!(graph.property("agora_rtc", "remote_stream_id"), Some(&json!(0)));
}

#[test]
fn rendering_is_idempotent_and_leaves_the_template_untouched() {
    let m = materializer();
    let mut req = request("room", "en-US");
    req.voice_type = "female".into();

    let first = m.render(&req).expect("first");
    let second = m.render(&req).expect("second");
    assert_eq!(first, second);

    let (_, pristine) = m.render(&request("other", "zh-CN")).expect("other");
    let azure = pristine.graph("va.openai.azure").expect("graph");
    assert!(!azure.auto_start);
    assert_eq!(azure.property("agora_rtc", "channel"), Some(&json!("")));
}

#[test]
fn voice_type_is_resolved_per_language_and_node() {
    let m = materializer();

    let mut english = request("room", "en-US");
    english.voice_type = "male".into();
    let (_, doc) = m.render(&english).expect("render");
    assert_eq!(
        doc.graph("va.openai.azure")
            .and_then(|g| g.property("azure_tts", "azure_synthesis_voice_name")),
        Some(&json!("en-US-BrianNeural"))
    );

    let mut chinese = request("room", "zh-CN");
    chinese.voice_type = "female".into();
    let (_, doc) = m.render(&chinese).expect("render");
    assert_eq!(
        doc.graph("va.qwen.cosy").and_then(|g| g.property("cosy_tts", "voice")),
        Some(&json!("longwan"))
    );
}

#[test]
fn custom_voice_table_maps_short_language_codes() {
    let field_map = FieldMap {
        graphs: HashMap::from([("en".to_owned(), "va.openai.azure".to_owned())]),
        fields: HashMap::from([(
            StartField::VoiceType,
            vec![PropertyTarget::new("azure_tts", "azure_synthesis_voice_name")],
        )]),
        voices: HashMap::from([(
            "en".to_owned(),
            HashMap::from([(
                "azure_tts".to_owned(),
                HashMap::from([("male".to_owned(), "vendor-male-1".to_owned())]),
            )]),
        )]),
        env_properties: HashMap::new(),
    };
    let m = materializer_with(field_map, std::path::Path::new("/unused"));

    let mut req = request("room", "en");
    req.voice_type = "male".into();
    let (_, doc) = m.render(&req).expect("render");
    assert_eq!(
        doc.graph("va.openai.azure")
            .and_then(|g| g.property("azure_tts", "azure_synthesis_voice_name")),
        Some(&json!("vendor-male-1"))
    );
}

#[test]
fn unmapped_voice_type_clears_voice_property() {
    let m = materializer();
    let mut req = request("room", "en-US");
    req.voice_type = "robot".into();

    let (_, doc) = m.render(&req).expect("render");
    assert_eq!(
        doc.graph("va.openai.azure")
            .and_then(|g| g.property("azure_tts", "azure_synthesis_voice_name")),
        Some(&json!(""))
    );
}

#[tokio::test]
async fn materialize_writes_unique_files_per_session() {
    let temp = tempfile::tempdir().expect("tempdir");
    let m = materializer_with(FieldMap::default(), temp.path());
    let req = request("room", "en-US");

    let first = m.materialize(&req).await.expect("first");
    let second = m.materialize(&req).await.expect("second");

    assert_ne!(first.config_path, second.config_path);
    assert!(first.config_path.starts_with(temp.path()));
    let name = first
        .config_path
        .file_name()
        .and_then(|n| n.to_str())
        .expect("file name");
    assert!(name.starts_with("property-") && name.ends_with(".json"));
    assert!(first
        .log_path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("app-") && n.ends_with(".log")));

    let written = PropertyDocument::from_json_str(
        &std::fs::read_to_string(&first.config_path).expect("read"),
    )
    .expect("parse written");
    assert_eq!(written, first.document);
    assert_eq!(first.graph_name, "va.openai.azure");
}

#[tokio::test]
async fn unwritable_work_dir_is_a_template_error() {
    let m = materializer_with(
        FieldMap::default(),
        std::path::Path::new("/nonexistent/work/dir"),
    );
    let err = m
        .materialize(&request("room", "en-US"))
        .await
        .expect_err("cannot write");
    assert!(matches!(err, AppError::Template(_)));
}
