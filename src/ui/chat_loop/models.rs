//! Background model refresh and load/unload tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::lms::{CommandRunner, LmsClient};
use crate::ui::state::ModelSnapshot;

pub const REFRESH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub enum ModelEvent {
    Refreshed(ModelSnapshot),
    ActionFinished {
        description: String,
        result: Result<String, String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelAction {
    Load(String),
    Unload(String),
    UnloadAll,
}

impl ModelAction {
    pub fn describe(&self) -> String {
        match self {
            ModelAction::Load(model) => format!("loading {model}"),
            ModelAction::Unload(model) => format!("unloading {model}"),
            ModelAction::UnloadAll => "unloading all models".to_string(),
        }
    }
}

pub async fn fetch_snapshot<R: CommandRunner>(lms: &LmsClient<R>) -> ModelSnapshot {
    let (status, loaded, downloaded) = tokio::join!(
        lms.status(),
        lms.loaded_models(),
        lms.downloaded_models()
    );
    ModelSnapshot {
        status: status.map_err(|err| err.to_string()),
        loaded: loaded.map_err(|err| err.to_string()),
        downloaded: downloaded.map_err(|err| err.to_string()),
    }
}

/// Refreshes every `interval`, or right away when `trigger` is notified,
/// until `shutdown` fires or the receiver goes away.
pub fn spawn_refresher<R>(
    lms: Arc<LmsClient<R>>,
    tx: mpsc::Sender<ModelEvent>,
    trigger: Arc<Notify>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()>
where
    R: CommandRunner + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
                _ = trigger.notified() => ticker.reset(),
            }
            let snapshot = fetch_snapshot(&lms).await;
            if tx.send(ModelEvent::Refreshed(snapshot)).await.is_err() {
                break;
            }
        }
        tracing::debug!("model refresher stopped");
    })
}

pub fn spawn_model_action<R>(
    lms: Arc<LmsClient<R>>,
    action: ModelAction,
    tx: mpsc::Sender<ModelEvent>,
    trigger: Arc<Notify>,
) -> JoinHandle<()>
where
    R: CommandRunner + 'static,
{
    tokio::spawn(async move {
        let result = match &action {
            ModelAction::Load(model) => lms.load(model).await,
            ModelAction::Unload(model) => lms.unload(model).await,
            ModelAction::UnloadAll => lms.unload_all().await.map(|()| String::new()),
        };
        let _ = tx
            .send(ModelEvent::ActionFinished {
                description: action.describe(),
                result: result.map_err(|err| err.to_string()),
            })
            .await;
        trigger.notify_one();
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lms::{LmsError, ServerStatus};
    use async_trait::async_trait;

    struct FakeLms;

    #[async_trait]
    impl CommandRunner for FakeLms {
        async fn run(&self, args: &[String]) -> Result<String, LmsError> {
            match args.join(" ").as_str() {
                "status" => Ok("Server: ON".into()),
                "ps --json" => Ok(r#"[{"identifier":"a"}]"#.into()),
                "ls --json" => Err(LmsError::NotFound),
                "load b" => Ok("Model loaded".into()),
                other => Err(LmsError::Spawn(format!("unexpected {other}"))),
            }
        }
    }

    #[tokio::test]
    async fn snapshot_parts_fail_independently() {
        let snapshot = fetch_snapshot(&LmsClient::with_runner(FakeLms)).await;
        assert_eq!(snapshot.status, Ok(ServerStatus::On));
        assert_eq!(snapshot.loaded.map(|m| m.len()), Ok(1));
        assert_eq!(
            snapshot.downloaded.unwrap_err(),
            "lms command not found in PATH"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn refresher_ticks_and_responds_to_trigger() {
        let lms = Arc::new(LmsClient::with_runner(FakeLms));
        let (tx, mut rx) = mpsc::channel(8);
        let trigger = Arc::new(Notify::new());
        let shutdown = CancellationToken::new();
        let handle = spawn_refresher(
            Arc::clone(&lms),
            tx,
            Arc::clone(&trigger),
            REFRESH_INTERVAL,
            shutdown.clone(),
        );

        // First tick fires immediately.
        assert!(matches!(rx.recv().await, Some(ModelEvent::Refreshed(_))));

        trigger.notify_one();
        assert!(matches!(rx.recv().await, Some(ModelEvent::Refreshed(_))));

        tokio::time::advance(REFRESH_INTERVAL).await;
        assert!(matches!(rx.recv().await, Some(ModelEvent::Refreshed(_))));

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn model_action_reports_and_triggers_refresh() {
        let lms = Arc::new(LmsClient::with_runner(FakeLms));
        let (tx, mut rx) = mpsc::channel(8);
        let trigger = Arc::new(Notify::new());

        spawn_model_action(lms, ModelAction::Load("b".into()), tx, Arc::clone(&trigger))
            .await
            .unwrap();

        match rx.recv().await {
            Some(ModelEvent::ActionFinished {
                description,
                result,
            }) => {
                assert_eq!(description, "loading b");
                assert_eq!(result, Ok("Model loaded".to_string()));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        // The stored permit makes this return immediately.
        trigger.notified().await;
    }
}
