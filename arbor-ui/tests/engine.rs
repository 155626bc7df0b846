/// Engine behaviour: dispatch modes, frame passes, background work, timers,
/// actions, state and shutdown.

use arbor_ui::node::builder::{button, div, p, span};
use arbor_ui::{
    Action, CancelToken, Cipher, Component, Context, Engine, EngineConfig, Event, Host, HostOp,
    MemoryHost, Node, NodeId, Registry, StorageError, StorageScope, sync,
};
use parking_lot::Mutex;
use serde_json::json;
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

fn config() -> EngineConfig {
    EngineConfig {
        log_level: "off".to_string(),
        ..EngineConfig::default()
    }
}

fn engine() -> Engine<MemoryHost> {
    Engine::new(MemoryHost::new(), Registry::new(), config()).unwrap()
}

type Log = Rc<RefCell<Vec<String>>>;

#[derive(Default)]
struct Counter {
    count: u32,
}

impl Component for Counter {
    fn render(&self) -> Option<Node> {
        Some(
            button()
                .on("click", |ctx, event| {
                    let silent = event.get("silent").is_some();
                    if let Some(counter) = ctx.component_mut::<Counter>() {
                        counter.count += 1;
                    }
                    if silent {
                        ctx.prevent_update();
                    }
                })
                .child(self.count.to_string())
                .into(),
        )
    }
}

fn click(engine: &mut Engine<MemoryHost>, button: NodeId, event: Event) {
    let handle = engine.tree().handle(button).unwrap();
    let listener = engine.host().find_listener(handle, "click").unwrap();
    engine.dispatcher().emit(listener, event);
    engine.consume_all();
}

/// A click re-renders the counter with a single text mutation
#[test]
fn test_event_updates_component() -> anyhow::Result<()> {
    let mut engine = engine();
    let root = engine.load(Counter::default())?;
    engine.consume_all();
    let button = engine.tree().children(root)[0];
    engine.host_mut().clear_ops();

    click(&mut engine, button, Event::new("click"));

    assert_eq!(engine.render_html()?, "<button>1</button>");
    assert_eq!(engine.host().ops().len(), 1);
    assert!(matches!(&engine.host().ops()[0], HostOp::SetText { value, .. } if value == "1"));
    Ok(())
}

#[test]
fn test_prevent_update_skips_render() -> anyhow::Result<()> {
    let mut engine = engine();
    let root = engine.load(Counter::default())?;
    engine.consume_all();
    let button = engine.tree().children(root)[0];

    click(
        &mut engine,
        button,
        Event::new("click").with_data(json!({ "silent": true })),
    );

    assert_eq!(engine.tree().component::<Counter>(root).map(|c| c.count), Some(1));
    assert_eq!(engine.render_html()?, "<button>0</button>");

    click(&mut engine, button, Event::new("click"));
    assert_eq!(engine.render_html()?, "<button>2</button>");
    Ok(())
}

#[derive(Default)]
struct Hooks {
    log: Log,
    mounted: u32,
}

impl Component for Hooks {
    fn render(&self) -> Option<Node> {
        Some(p().child(format!("mounted {}", self.mounted)).into())
    }

    fn on_mount(&mut self, _ctx: &mut Context<'_>) {
        self.mounted += 1;
        self.log.borrow_mut().push("mount".to_string());
    }

    fn on_dismount(&mut self, _ctx: &mut Context<'_>) {
        self.log.borrow_mut().push("dismount".to_string());
    }

    fn on_resize(&mut self, ctx: &mut Context<'_>) {
        let (width, height) = ctx.viewport();
        self.log.borrow_mut().push(format!("resize {width}x{height}"));
    }

    fn on_app_update(&mut self, _ctx: &mut Context<'_>) {
        self.log.borrow_mut().push("app update".to_string());
    }
}

/// Mount runs the hook and re-renders; shutdown dismounts everything
#[test]
fn test_lifecycle_hooks() -> anyhow::Result<()> {
    let log = Log::default();
    let mut engine = engine();
    engine.load(Hooks {
        log: log.clone(),
        mounted: 0,
    })?;
    engine.consume_all();
    assert_eq!(engine.render_html()?, "<p>mounted 1</p>");

    engine.host_mut().set_viewport(800, 600);
    engine.resize();
    engine.app_update();
    engine.consume_all();

    engine.shutdown();
    assert_eq!(
        *log.borrow(),
        vec!["mount", "resize 800x600", "app update", "dismount"]
    );
    assert!(engine.root().is_none());
    assert!(engine.tree().is_empty());
    assert_eq!(engine.host().live_nodes(), 0);
    Ok(())
}

struct Parent {
    log: Log,
    show_child: bool,
}

impl Component for Parent {
    fn render(&self) -> Option<Node> {
        self.log.borrow_mut().push("parent".to_string());
        let mut root = div();
        if self.show_child {
            root = root.child(Node::component(Child {
                log: self.log.clone(),
            }));
        }
        Some(root.into())
    }
}

struct Child {
    log: Log,
}

impl Component for Child {
    fn render(&self) -> Option<Node> {
        self.log.borrow_mut().push("child".to_string());
        Some(span().child(div().child("leaf")).into())
    }

    fn update_fields(&mut self, _next: &dyn Any) -> bool {
        true
    }
}

struct Boom;

impl Component for Boom {
    fn render(&self) -> Option<Node> {
        Some(p().on("click", |_ctx, _event| {}).child("boom").into())
    }

    fn on_dismount(&mut self, _ctx: &mut Context<'_>) {
        panic!("dismount hook failed");
    }
}

/// A panicking dismount hook does not stop the rest of the teardown
#[test]
fn test_dismount_hook_panic_is_contained() -> anyhow::Result<()> {
    let mut engine = engine();
    let tree = engine.tree_mut();
    let id = tree.mount(
        div()
            .child(Node::component(Boom))
            .child(span().on("click", |_ctx, _event| {}).child("after"))
            .into(),
        None,
        0,
    )?;
    assert_eq!(tree.host().live_listeners(), 2);

    tree.dismount(id);

    assert_eq!(tree.host().live_nodes(), 0);
    assert_eq!(tree.host().live_listeners(), 0);
    assert!(tree.is_empty());
    assert!(tree.updates().is_empty());

    let root = engine.load(Counter::default())?;
    engine.consume_all();
    let button = engine.tree().children(root)[0];
    click(&mut engine, button, Event::new("click"));
    assert_eq!(engine.render_html()?, "<button>1</button>");
    Ok(())
}

fn load_parent(engine: &mut Engine<MemoryHost>, log: &Log) -> (NodeId, NodeId) {
    let root = engine
        .load(Parent {
            log: log.clone(),
            show_child: true,
        })
        .unwrap();
    engine.consume_all();
    let container = engine.tree().children(root)[0];
    let child = engine.tree().children(container)[0];
    log.borrow_mut().clear();
    (root, child)
}

/// Parents render before their descendants, and a descendant dropped by its
/// parent's render is not rendered at all
#[test]
fn test_depth_order_and_dropped_children() {
    let log = Log::default();
    let mut engine = engine();
    let (root, child) = load_parent(&mut engine, &log);
    assert_eq!(engine.tree().depth(root), Some(0));
    assert_eq!(engine.tree().depth(child), Some(2));

    engine.tree_mut().mark_dirty(child);
    engine.tree_mut().mark_dirty(root);
    engine.frame();
    assert_eq!(*log.borrow(), vec!["parent", "child"]);

    log.borrow_mut().clear();
    engine.tree_mut().mark_dirty(child);
    engine.tree_mut().mark_dirty(root);
    if let Some(parent) = engine.tree_mut().component_mut::<Parent>(root) {
        parent.show_child = false;
    }
    engine.frame();

    assert_eq!(*log.borrow(), vec!["parent"]);
    assert!(!engine.tree().is_mounted(child));
    assert_eq!(engine.render_html().unwrap(), "<div></div>");
}

#[test]
fn test_repeated_marks_render_once() {
    let log = Log::default();
    let mut engine = engine();
    let (_, child) = load_parent(&mut engine, &log);

    assert!(engine.tree_mut().mark_dirty(child));
    for _ in 0..9 {
        assert!(!engine.tree_mut().mark_dirty(child));
    }
    engine.frame();

    assert_eq!(*log.borrow(), vec!["child"]);
}

/// Work queued for a node that is gone by the time it runs is dropped
#[test]
fn test_dispatch_for_dismounted_source_is_dropped() {
    let log = Log::default();
    let mut engine = engine();
    let (root, child) = load_parent(&mut engine, &log);
    let ran = Arc::new(AtomicBool::new(false));

    let flag = ran.clone();
    engine.dispatcher().dispatch(root, move |ctx| {
        if let Some(parent) = ctx.component_mut::<Parent>() {
            parent.show_child = false;
        }
        // Queued mid-pass, so it runs on the next pass, after the re-render
        ctx.dispatcher().dispatch(child, move |_ctx| {
            flag.store(true, Ordering::SeqCst);
        });
    });

    engine.frame();
    assert!(!engine.tree().is_mounted(child));
    assert_eq!(engine.pending(), 1);

    engine.frame();
    assert_eq!(engine.pending(), 0);
    assert!(!ran.load(Ordering::SeqCst));
}

/// Deferred work runs after the pass that reconciles the component
#[test]
fn test_defer_runs_after_reconcile() -> anyhow::Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut engine = engine();
    let root = engine.load(Counter::default())?;
    engine.consume_all();

    let deferred = seen.clone();
    engine.dispatcher().defer(root, move |ctx| {
        let count = ctx.component::<Counter>().map(|c| c.count);
        deferred.lock().push(count);
    });
    engine.dispatcher().dispatch(root, |ctx| {
        if let Some(counter) = ctx.component_mut::<Counter>() {
            counter.count = 5;
        }
    });
    assert!(engine.frame());

    assert_eq!(*seen.lock(), vec![Some(5)]);
    assert_eq!(engine.render_html()?, "<button>5</button>");
    Ok(())
}

#[derive(Default)]
struct Loader {
    data: Option<String>,
}

impl Component for Loader {
    fn render(&self) -> Option<Node> {
        Some(
            div()
                .child(self.data.clone().unwrap_or_else(|| "loading".to_string()))
                .into(),
        )
    }

    fn on_mount(&mut self, ctx: &mut Context<'_>) {
        let source = ctx.source();
        ctx.spawn(move |dispatcher| {
            thread::sleep(Duration::from_millis(20));
            dispatcher.dispatch(source, |ctx| {
                if let Some(loader) = ctx.component_mut::<Loader>() {
                    loader.data = Some("loaded".to_string());
                }
            });
        });
    }
}

#[test]
fn test_spawned_work_reports_back() -> anyhow::Result<()> {
    let mut engine = engine();
    engine.load(Loader::default())?;
    engine.frame();
    assert_eq!(engine.render_html()?, "<div>loading</div>");

    engine.consume_all();
    assert_eq!(engine.render_html()?, "<div>loaded</div>");
    Ok(())
}

#[derive(Default)]
struct Ticker {
    ticks: u32,
    fired: Option<Arc<AtomicBool>>,
}

impl Component for Ticker {
    fn render(&self) -> Option<Node> {
        Some(span().child(format!("ticks {}", self.ticks)).into())
    }

    fn on_mount(&mut self, ctx: &mut Context<'_>) {
        let fired = self.fired.clone();
        ctx.after(Duration::from_millis(10), move |ctx| {
            if let Some(fired) = fired {
                fired.store(true, Ordering::SeqCst);
            }
            if let Some(ticker) = ctx.component_mut::<Ticker>() {
                ticker.ticks += 1;
            }
        });
    }
}

#[test]
fn test_timer_fires_and_rerenders() -> anyhow::Result<()> {
    let mut engine = engine();
    engine.load(Ticker::default())?;
    engine.consume_all();
    assert_eq!(engine.render_html()?, "<span>ticks 0</span>");

    thread::sleep(Duration::from_millis(20));
    engine.consume_all();
    assert_eq!(engine.render_html()?, "<span>ticks 1</span>");
    Ok(())
}

#[test]
fn test_timer_cancelled_on_dismount() -> anyhow::Result<()> {
    let fired = Arc::new(AtomicBool::new(false));
    let mut engine = engine();
    engine.load(Ticker {
        ticks: 0,
        fired: Some(fired.clone()),
    })?;
    engine.consume_all();
    engine.load(Counter::default())?;

    thread::sleep(Duration::from_millis(20));
    engine.consume_all();
    assert!(!fired.load(Ordering::SeqCst));
    assert_eq!(engine.render_html()?, "<button>0</button>");
    Ok(())
}

#[derive(Default)]
struct Inbox {
    received: Vec<String>,
}

impl Component for Inbox {
    fn render(&self) -> Option<Node> {
        Some(div().child(self.received.join(",")).into())
    }

    fn on_mount(&mut self, ctx: &mut Context<'_>) {
        ctx.handle_action("greet", |ctx, action| {
            let name = action.value.as_str().unwrap_or_default().to_string();
            if let Some(inbox) = ctx.component_mut::<Inbox>() {
                inbox.received.push(name);
            }
        });
    }
}

#[test]
fn test_actions_reach_handlers() -> anyhow::Result<()> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let mut registry = Registry::new();
    let app_seen = seen.clone();
    registry.handle("greet", move |_ctx, action| {
        app_seen.borrow_mut().push(action.value.clone());
    })?;

    let mut engine = Engine::new(MemoryHost::new(), registry, config())?;
    engine.load(Inbox::default())?;
    engine.consume_all();

    engine.dispatcher().post(Action::new("greet", json!("ada")));
    engine.dispatcher().post(Action::new("greet", json!("bob")).tag("from", "test"));
    engine.dispatcher().post(Action::new("ignored", json!(null)));
    engine.consume_all();

    assert_eq!(engine.render_html()?, "<div>ada,bob</div>");
    assert_eq!(*seen.borrow(), vec![json!("ada"), json!("bob")]);
    Ok(())
}

#[test]
fn test_action_handlers_dropped_with_component() -> anyhow::Result<()> {
    let mut engine = engine();
    engine.load(Inbox::default())?;
    engine.consume_all();
    let inbox = engine.root().unwrap();

    engine.load(Counter::default())?;
    engine.dispatcher().post(Action::new("greet", json!("ada")));
    engine.consume_all();

    assert!(!engine.tree().is_mounted(inbox));
    assert_eq!(engine.render_html()?, "<button>0</button>");
    Ok(())
}

#[derive(Default)]
struct Themed {
    theme: String,
}

impl Component for Themed {
    fn render(&self) -> Option<Node> {
        Some(div().class(&self.theme).into())
    }

    fn on_mount(&mut self, ctx: &mut Context<'_>) {
        ctx.observe_state("theme", |ctx, value| {
            let theme = value.as_str().unwrap_or_default().to_string();
            if let Some(themed) = ctx.component_mut::<Themed>() {
                themed.theme = theme;
            }
        });
    }
}

/// Observers are notified on a later pass, never from inside `set_state`
#[test]
fn test_state_notifies_through_queue() -> anyhow::Result<()> {
    let mut engine = engine();
    let root = engine.load(Themed::default())?;
    engine.consume_all();

    let read_back = Arc::new(Mutex::new(None));
    let slot = read_back.clone();
    engine.dispatcher().next(root, move |ctx| {
        ctx.set_state("theme", &"dark").unwrap();
        let theme = ctx.component::<Themed>().map(|t| t.theme.clone());
        *slot.lock() = Some((ctx.get_state::<String>("theme").unwrap(), theme));
    });
    engine.consume_all();

    assert_eq!(
        *read_back.lock(),
        Some((Some("dark".to_string()), Some(String::new())))
    );
    assert_eq!(engine.render_html()?, "<div class=\"dark\"></div>");

    // Setting the same value again notifies nobody
    engine.host_mut().clear_ops();
    engine.dispatcher().next(root, |ctx| ctx.set_state("theme", &"dark").unwrap());
    engine.consume_all();
    assert!(engine.host().ops().is_empty());
    Ok(())
}

#[test]
fn test_storage_and_device_id() -> anyhow::Result<()> {
    let mut engine = engine();
    let root = engine.load(Counter::default())?;
    engine.consume_all();

    let ids = Arc::new(Mutex::new(Vec::new()));
    let out = ids.clone();
    engine.dispatcher().next(root, move |ctx| {
        let mut storage = ctx.session_storage();
        storage.set("draft", &json!({ "title": "hello" })).unwrap();
        assert!(storage.contains("draft"));
        let mut ids = out.lock();
        ids.push(ctx.device_id().unwrap());
        ids.push(ctx.device_id().unwrap());
    });
    engine.consume_all();

    let ids = ids.lock();
    assert_eq!(ids.len(), 2);
    assert_eq!(ids[0], ids[1]);
    assert_eq!(ids[0].len(), 32);
    assert!(ids[0].chars().all(|c| c.is_ascii_hexdigit()));
    let stored = engine
        .host()
        .storage_get(StorageScope::Local, "arbor.device_id");
    assert_eq!(stored, Some(format!("\"{}\"", ids[0])));
    assert_eq!(
        engine.host().storage_get(StorageScope::Session, "draft"),
        Some("{\"title\":\"hello\"}".to_string())
    );
    Ok(())
}

struct Xor(u8);

impl Cipher for Xor {
    fn encrypt(&self, plain: &[u8]) -> Result<Vec<u8>, StorageError> {
        Ok(plain.iter().map(|b| b ^ self.0).collect())
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, StorageError> {
        self.encrypt(data)
    }
}

#[test]
fn test_encryption_uses_installed_cipher() -> anyhow::Result<()> {
    let mut engine = engine().with_cipher(Xor(0x5a));
    let root = engine.load(Counter::default())?;
    engine.consume_all();

    let result = Arc::new(Mutex::new(None));
    let out = result.clone();
    engine.dispatcher().next(root, move |ctx| {
        let sealed = ctx.encrypt(&vec![1, 2, 3]).unwrap();
        assert_ne!(sealed, b"[1,2,3]".to_vec());
        *out.lock() = Some(ctx.decrypt::<Vec<u32>>(&sealed).unwrap());
    });
    engine.consume_all();

    assert_eq!(*result.lock(), Some(vec![1, 2, 3]));
    Ok(())
}

#[test]
fn test_encryption_without_cipher_fails() -> anyhow::Result<()> {
    let mut engine = engine();
    let root = engine.load(Counter::default())?;
    engine.consume_all();

    let failed = Arc::new(AtomicBool::new(false));
    let out = failed.clone();
    engine.dispatcher().next(root, move |ctx| {
        let err = ctx.encrypt(&"secret").unwrap_err();
        out.store(matches!(err, StorageError::NoCipher), Ordering::SeqCst);
    });
    engine.consume_all();

    assert!(failed.load(Ordering::SeqCst));
    Ok(())
}

/// Idle passes double the interval up to the cap; work resets it
#[test]
fn test_tick_backoff() -> anyhow::Result<()> {
    let config = EngineConfig {
        frame_rate: 10,
        max_tick: Duration::from_millis(500),
        ..config()
    };
    let mut engine = Engine::new(MemoryHost::new(), Registry::new(), config)?;
    let base = Duration::from_millis(100);
    assert_eq!(engine.tick_interval(), base);

    assert_eq!(engine.tick(), base * 2);
    assert_eq!(engine.tick(), base * 4);
    assert_eq!(engine.tick(), Duration::from_millis(500));
    assert_eq!(engine.tick(), Duration::from_millis(500));

    let root = engine.load(Counter::default())?;
    assert_eq!(engine.tick(), base);
    assert_eq!(engine.tick(), base * 2);

    engine.dispatcher().dispatch(root, |_ctx| {});
    assert_eq!(engine.tick(), base);

    engine.tick();
    engine.dispatcher().request_immediate();
    assert_eq!(engine.tick(), base);
    Ok(())
}

/// The run loop picks up work from other threads until it is cancelled
#[test]
fn test_run_until_cancelled() -> anyhow::Result<()> {
    let config = EngineConfig {
        frame_rate: 100,
        max_tick: Duration::from_millis(20),
        ..config()
    };
    let mut engine = Engine::new(MemoryHost::new(), Registry::new(), config)?;
    let root = engine.load(Counter::default())?;

    let token = CancelToken::new();
    let dispatcher = engine.dispatcher();
    let stop = token.clone();
    let worker = thread::spawn(move || {
        dispatcher.dispatch(root, |ctx| {
            if let Some(counter) = ctx.component_mut::<Counter>() {
                counter.count = 7;
            }
        });
        thread::sleep(Duration::from_millis(100));
        stop.cancel();
    });

    engine.run(&token);
    worker.join().unwrap();

    assert_eq!(engine.render_html()?, "<button>7</button>");
    Ok(())
}

#[derive(Default)]
struct Named {
    label: String,
}

impl Component for Named {
    fn render(&self) -> Option<Node> {
        Some(
            div()
                .child(Node::named("badge"))
                .child(self.label.as_str())
                .into(),
        )
    }

    fn update_fields(&mut self, next: &dyn Any) -> bool {
        let Some(next) = next.downcast_ref::<Self>() else {
            return false;
        };
        sync(&mut self.label, &next.label)
    }
}

#[derive(Default)]
struct Badge;

impl Component for Badge {
    fn render(&self) -> Option<Node> {
        Some(span().class("badge").child("new").into())
    }
}

#[test]
fn test_named_components_resolve_through_registry() -> anyhow::Result<()> {
    let mut registry = Registry::new();
    registry.register_default::<Badge>("badge")?;
    let mut engine = Engine::new(MemoryHost::new(), registry, config())?;

    let root = engine.load(Named {
        label: "a".to_string(),
    })?;
    engine.consume_all();
    assert_eq!(
        engine.render_html()?,
        "<div>\n  <span class=\"badge\">new</span>\n  a\n</div>"
    );

    engine.host_mut().clear_ops();
    assert_eq!(
        engine.load(Named {
            label: "b".to_string(),
        })?,
        root
    );
    assert_eq!(engine.host().count(HostOp::is_create), 0);
    assert_eq!(engine.host().count(|op| matches!(op, HostOp::SetText { .. })), 1);
    Ok(())
}

#[test]
fn test_unregistered_name_fails_to_load() {
    let mut engine = engine();
    let err = engine.load(Named::default()).unwrap_err();
    assert!(matches!(err, arbor_ui::EngineError::Load(_)));
    assert!(engine.root().is_none());
    assert_eq!(engine.host().live_nodes(), 0);
}
