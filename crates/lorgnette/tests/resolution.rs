//! End-to-end target resolution: a real source tree on disk, a bare
//! module target, and a scripted host exercising what the analyzer
//! enumerated.

use std::path::PathBuf;
use std::sync::Arc;

use lorgnette::types::{
    Binding, EventKind, Identity, ObjKey, ObsValue, Receiver, StepEvent, StepKind,
};
use lorgnette::{MemorySink, TraceConfig, Tracer};

const DEMO_SRC: &str = r#"
pub static GLOBAL_STEP: u64 = 0;

pub struct Trainer {
    pub lr: f32,
}

impl Trainer {
    pub fn step(&mut self) {
        self.lr = self.lr * 0.99;
    }
}

pub fn launch() {}
"#;

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

fn write_demo_tree() -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "lorgnette-resolution-{}-{:?}",
        std::process::id(),
        std::thread::current().id()
    ));
    std::fs::create_dir_all(&dir).expect("create source root");
    std::fs::write(dir.join("demo.rs"), DEMO_SRC).expect("write demo module");
    dir
}

#[test]
fn bare_module_target_traces_enumerated_symbols() {
    init_logging();
    let root = write_demo_tree();
    let config = TraceConfig::builder()
        .target_str("demo")
        .track_globals(true)
        .source_root(root.clone())
        .build()
        .expect("valid config");
    let sink = Arc::new(MemorySink::new());
    let tracer = Tracer::with_sink(config, sink.clone()).expect("tracer construction");
    let dispatcher = tracer.dispatcher();

    // Method of the enumerated class, with an attribute mutation.
    let receiver = |attrs: Vec<Binding>| {
        Some(Receiver {
            identity: Identity::Object(ObjKey::new(1).expect("non-zero key")),
            attrs,
        })
    };
    let mut enter = StepEvent::new(StepKind::Enter, "demo", "step");
    enter.class = Some("Trainer".into());
    enter.frame = 1;
    enter.receiver = receiver(vec![Binding::new("lr", ObsValue::inline("0.1"))]);
    dispatcher.handle_step(&enter);

    let mut step = StepEvent::new(StepKind::Step, "demo", "step");
    step.class = Some("Trainer".into());
    step.frame = 1;
    step.receiver = receiver(vec![Binding::new("lr", ObsValue::inline("0.099"))]);
    dispatcher.handle_step(&step);

    let mut exit = StepEvent::new(StepKind::Exit, "demo", "step");
    exit.class = Some("Trainer".into());
    exit.frame = 1;
    exit.receiver = receiver(vec![]);
    dispatcher.handle_step(&exit);

    // Enumerated free function.
    let mut fn_enter = StepEvent::new(StepKind::Enter, "demo", "launch");
    fn_enter.frame = 2;
    dispatcher.handle_step(&fn_enter);
    let mut fn_exit = StepEvent::new(StepKind::Exit, "demo", "launch");
    fn_exit.frame = 2;
    dispatcher.handle_step(&fn_exit);

    // Enumerated module global, observed from an untraced function.
    let mut global_step = StepEvent::new(StepKind::Step, "demo", "helper");
    global_step.globals = vec![Binding::new("GLOBAL_STEP", ObsValue::inline("0"))];
    dispatcher.handle_step(&global_step);
    let mut global_step = StepEvent::new(StepKind::Step, "demo", "helper");
    global_step.globals = vec![Binding::new("GLOBAL_STEP", ObsValue::inline("1"))];
    dispatcher.handle_step(&global_step);

    let events = sink.snapshot();
    let kinds: Vec<EventKind> = events.iter().map(|event| event.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::Run,
            EventKind::Upd,
            EventKind::End,
            EventKind::Run,
            EventKind::End,
            EventKind::Upd,
        ]
    );
    assert_eq!(events[1].scope_name, "Trainer");
    assert_eq!(events[1].old.as_deref(), Some("0.1"));
    assert_eq!(events[5].scope_name, "demo");
    assert_eq!(events[5].key.as_deref(), Some("GLOBAL_STEP"));

    std::fs::remove_dir_all(&root).expect("cleanup temp tree");
}

#[test]
fn unknown_module_target_degrades_to_partial_coverage() {
    init_logging();
    let config = TraceConfig::builder()
        .target_str("ghost.module")
        .target_str("demo:Widget")
        .build()
        .expect("valid config");
    let sink = Arc::new(MemorySink::new());
    let tracer = Tracer::with_sink(config, sink.clone()).expect("resolution must not fail");
    let dispatcher = tracer.dispatcher();

    // The resolvable target still traces.
    let mut enter = StepEvent::new(StepKind::Enter, "demo", "m");
    enter.class = Some("Widget".into());
    enter.frame = 1;
    dispatcher.handle_step(&enter);

    let events = sink.snapshot();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Run);
}
