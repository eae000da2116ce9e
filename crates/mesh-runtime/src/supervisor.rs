//! Ring supervisor.
//!
//! Owns the five device task handles for the lifetime of a running node,
//! polling for unexpected exits and coordinating graceful shutdown — the
//! same health-check-loop-plus-timeout-then-abort shape the protocol
//! runtime's task supervisor uses, scaled down to a fixed set of five
//! always-present tasks instead of a restartable pool.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use mesh_core::Orientation;

const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceHealth {
    Running,
    Exited,
}

pub(crate) enum SupervisorCommand {
    Health {
        reply: oneshot::Sender<HashMap<Orientation, DeviceHealth>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

pub(crate) struct RingSupervisor {
    handles: HashMap<Orientation, JoinHandle<()>>,
    command_rx: mpsc::Receiver<SupervisorCommand>,
    poll_interval: Duration,
}

impl RingSupervisor {
    pub fn new(
        handles: HashMap<Orientation, JoinHandle<()>>,
        command_rx: mpsc::Receiver<SupervisorCommand>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            handles,
            command_rx,
            poll_interval,
        }
    }

    /// Poll for unexpected exits and react to commands until every device
    /// task has finished (normal shutdown) or a `Shutdown` command arrives.
    pub async fn run(mut self) {
        let mut already_exited: HashSet<Orientation> = HashSet::new();
        let mut ticker = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.warn_on_new_exits(&mut already_exited);
                    if self.all_finished() {
                        info!("all device tasks exited, supervisor stopping");
                        break;
                    }
                }
                Some(command) = self.command_rx.recv() => {
                    match command {
                        SupervisorCommand::Health { reply } => {
                            let _ = reply.send(self.health());
                        }
                        SupervisorCommand::Shutdown { reply } => {
                            self.join_with_timeout().await;
                            let _ = reply.send(());
                            break;
                        }
                    }
                }
                else => break,
            }
        }
    }

    fn all_finished(&self) -> bool {
        self.handles.values().all(|h| h.is_finished())
    }

    fn warn_on_new_exits(&self, already_exited: &mut HashSet<Orientation>) {
        for (orientation, handle) in &self.handles {
            if handle.is_finished() && already_exited.insert(*orientation) {
                warn!(?orientation, "device task exited unexpectedly");
            }
        }
    }

    fn health(&self) -> HashMap<Orientation, DeviceHealth> {
        self.handles
            .iter()
            .map(|(o, h)| {
                let health = if h.is_finished() {
                    DeviceHealth::Exited
                } else {
                    DeviceHealth::Running
                };
                (*o, health)
            })
            .collect()
    }

    /// Give every device task a chance to exit cooperatively (the caller has
    /// already pushed `DeviceEvent::Shutdown` into each event queue), then
    /// abort whatever is still running.
    async fn join_with_timeout(&mut self) {
        let deadline = Instant::now() + SHUTDOWN_JOIN_TIMEOUT;
        while Instant::now() < deadline && !self.all_finished() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        for (orientation, handle) in &self.handles {
            if !handle.is_finished() {
                warn!(?orientation, "device task did not exit in time, aborting");
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_reports_running_until_task_completes() {
        let mut handles = HashMap::new();
        handles.insert(Orientation::North, tokio::spawn(async {}));
        let (_cmd_tx, cmd_rx) = mpsc::channel(4);
        let supervisor = RingSupervisor::new(handles, cmd_rx, Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(20)).await;
        let health = supervisor.health();
        assert_eq!(health.get(&Orientation::North), Some(&DeviceHealth::Exited));
    }

    #[tokio::test]
    async fn shutdown_command_resolves_once_all_tasks_finish() {
        let mut handles = HashMap::new();
        handles.insert(Orientation::Center, tokio::spawn(async {}));
        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        let supervisor = RingSupervisor::new(handles, cmd_rx, Duration::from_millis(10));
        let run_handle = tokio::spawn(supervisor.run());

        let (reply_tx, reply_rx) = oneshot::channel();
        cmd_tx
            .send(SupervisorCommand::Shutdown { reply: reply_tx })
            .await
            .unwrap();
        reply_rx.await.unwrap();
        run_handle.await.unwrap();
    }
}
