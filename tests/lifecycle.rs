//! Full open/close cycles over a configured node with plugins.

use lumenchain::config::{Config, ConfigInput, Value};
use lumenchain::error::Result;
use lumenchain::node::{Node, MODULE};
use lumenchain::plugin::{BoxFuture, Plugin, PluginInstance};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

struct Recording {
    tag: String,
    log: Arc<Mutex<Vec<String>>>,
    fail_open: bool,
}

impl PluginInstance for Recording {
    fn open(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.fail_open {
                return Err(lumenchain::NodeError::Plugin(format!(
                    "{} refused to open",
                    self.tag
                )));
            }
            self.log.lock().push(format!("open:{}", self.tag));
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.log.lock().push(format!("close:{}", self.tag));
            Ok(())
        })
    }
}

fn plugin(id: &str, log: Arc<Mutex<Vec<String>>>) -> Plugin {
    plugin_with(id, log, false)
}

fn plugin_with(id: &str, log: Arc<Mutex<Vec<String>>>, fail_open: bool) -> Plugin {
    let tag = id.to_string();
    Plugin::new(Some(id), move |_node| {
        Ok(Arc::new(Recording {
            tag: tag.clone(),
            log: log.clone(),
            fail_open,
        }) as Arc<dyn PluginInstance>)
    })
}

fn test_config() -> Config {
    Config::with_roots(MODULE, PathBuf::from("/home/tester"), PathBuf::from("/work"))
}

#[tokio::test]
async fn config_driven_plugins_follow_registration_order() {
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut input = ConfigInput {
        argv: Some(vec![
            "lumen-node".to_string(),
            "--plugins=alpha,beta".to_string(),
        ]),
        ..ConfigInput::default()
    };

    let loader_log = log.clone();
    let loader: lumenchain::plugin::PluginLoader =
        Arc::new(move |name: &str| Ok(plugin(name, loader_log.clone())));
    input.options.insert("loader".to_string(), Value::func(loader));

    let mut node = Node::with_config(test_config(), input).unwrap();
    node.load_plugins().unwrap();

    node.open().await.unwrap();
    node.close().await.unwrap();

    assert_eq!(
        *log.lock(),
        vec!["open:alpha", "open:beta", "close:alpha", "close:beta"]
    );
}

#[tokio::test]
async fn failed_plugin_open_propagates_without_rollback() {
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut node = Node::with_config(test_config(), ConfigInput::default()).unwrap();
    node.use_plugin(&plugin("first", log.clone())).unwrap();
    node.use_plugin(&plugin_with("broken", log.clone(), true))
        .unwrap();
    node.use_plugin(&plugin("third", log.clone())).unwrap();

    let errors = Arc::new(Mutex::new(Vec::new()));
    let errors2 = errors.clone();
    node.events.on("error", move |payload| {
        errors2.lock().push(payload.to_string());
    });

    let err = node.open().await.unwrap_err();
    assert!(err.to_string().contains("broken"));

    // The earlier plugin stays open; the later one was never reached.
    assert_eq!(*log.lock(), vec!["open:first"]);
    assert_eq!(errors.lock().len(), 1);
}

#[tokio::test]
async fn plugin_error_events_reach_the_node_channel() {
    struct Noisy {
        emitter: Arc<lumenchain::events::EventEmitter>,
    }

    impl PluginInstance for Noisy {
        fn events(&self) -> Option<Arc<lumenchain::events::EventEmitter>> {
            Some(self.emitter.clone())
        }
    }

    let emitter = Arc::new(lumenchain::events::EventEmitter::new());
    let emitter2 = emitter.clone();

    let mut node = Node::with_config(test_config(), ConfigInput::default()).unwrap();
    let noisy = Plugin::new(Some("noisy"), move |_node| {
        Ok(Arc::new(Noisy {
            emitter: emitter2.clone(),
        }) as Arc<dyn PluginInstance>)
    });
    node.use_plugin(&noisy).unwrap();

    let forwarded = Arc::new(Mutex::new(Vec::new()));
    let forwarded2 = forwarded.clone();
    node.events.on("error", move |payload| {
        forwarded2.lock().push(payload.clone());
    });

    emitter.emit("error", &serde_json::json!("disk on fire"));

    assert_eq!(*forwarded.lock(), vec![serde_json::json!("disk on fire")]);
}

#[tokio::test]
async fn info_reflects_lifecycle() {
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut node = Node::with_config(test_config(), ConfigInput::default()).unwrap();
    node.use_plugin(&plugin("indexer", log)).unwrap();

    let info = node.info();
    assert_eq!(info.module, "lumen");
    assert_eq!(info.network, "mainnet");
    assert_eq!(info.state, "idle");
    assert_eq!(info.plugins, vec!["indexer".to_string()]);
    assert_eq!(info.uptime, 0);

    node.open().await.unwrap();
    assert_eq!(node.info().state, "open");

    node.close().await.unwrap();
    assert_eq!(node.info().state, "idle");
}

#[tokio::test]
async fn passthrough_arguments_survive_resolution() {
    let input = ConfigInput {
        argv: Some(
            ["lumen-node", "--network=regtest", "--", "--verbatim", "x"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        ),
        ..ConfigInput::default()
    };

    let node = Node::with_config(test_config(), input).unwrap();

    assert_eq!(node.network, "regtest");
    assert_eq!(
        node.config.passthrough(),
        &["--verbatim".to_string(), "x".to_string()]
    );
}
