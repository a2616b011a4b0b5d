//! host — остановка/запуск Home Assistant вокруг разрушающих операций.
//!
//! Методы управления — закрытый набор (ControlMethod), пробуются в фиксированном
//! порядке: Supervisor (`ha core`), Systemd, Docker. Каким методом удалось
//! остановить, тем же и запускаем.
//!
//! Брекет:
//!   stop → settle delay → операции (ошибка одной логируется, остальные идут)
//!   → restart ВСЕГДА (Drop у HostBracket, в т.ч. при панике) → сброс кэша реестров.
//!
//! Если остановить не удалось ни одним методом — спрашиваем оператора; отказ
//! означает отмену операции (ProcessControlFailed).

use log::{debug, error, info, warn};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::consts::{HA_CONTAINER_NAME, HA_SYSTEMD_UNIT};
use crate::error::{CleanupError, Result};
use crate::prompt::Operator;
use crate::registry::{DocCache, RegistryStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlMethod {
    Supervisor,
    Systemd,
    Docker,
}

impl ControlMethod {
    pub const ALL: [ControlMethod; 3] = [
        ControlMethod::Supervisor,
        ControlMethod::Systemd,
        ControlMethod::Docker,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlMethod::Supervisor => "ha",
            ControlMethod::Systemd => "systemctl",
            ControlMethod::Docker => "docker",
        }
    }

    /// (program, args) for stop (`start = false`) or start.
    pub fn command(&self, start: bool) -> (&'static str, Vec<&'static str>) {
        let verb = if start { "start" } else { "stop" };
        match self {
            ControlMethod::Supervisor => ("ha", vec!["core", verb]),
            ControlMethod::Systemd => ("systemctl", vec![verb, HA_SYSTEMD_UNIT]),
            ControlMethod::Docker => ("docker", vec![verb, HA_CONTAINER_NAME]),
        }
    }
}

pub trait HostControl {
    /// Try every method in order; the first that succeeds is returned.
    fn stop(&mut self) -> Option<ControlMethod>;
    fn start(&mut self, method: ControlMethod) -> bool;
}

/// Real host control through external commands, each bounded by `timeout`.
pub struct CommandHost {
    methods: Vec<ControlMethod>,
    timeout: Duration,
}

impl CommandHost {
    pub fn new(timeout: Duration) -> Self {
        Self {
            methods: ControlMethod::ALL.to_vec(),
            timeout,
        }
    }
}

impl HostControl for CommandHost {
    fn stop(&mut self) -> Option<ControlMethod> {
        for m in &self.methods {
            let (prog, args) = m.command(false);
            if run_bounded(prog, &args, self.timeout) {
                return Some(*m);
            }
        }
        None
    }

    fn start(&mut self, method: ControlMethod) -> bool {
        let (prog, args) = method.command(true);
        run_bounded(prog, &args, self.timeout)
    }
}

/// Spawn and wait at most `timeout`. Missing binary, non-zero exit or timeout → false.
pub fn run_bounded(program: &str, args: &[&str], timeout: Duration) -> bool {
    let mut child = match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(c) => c,
        Err(e) => {
            debug!("host: {} {:?}: {}", program, args, e);
            return false;
        }
    };

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!("host: {} {:?} -> {}", program, args, status);
                return status.success();
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    warn!("host: {} {:?} timed out after {:?}", program, args, timeout);
                    let _ = child.kill();
                    let _ = child.wait();
                    return false;
                }
                thread::sleep(Duration::from_millis(100));
            }
            Err(e) => {
                warn!("host: wait for {} failed: {}", program, e);
                return false;
            }
        }
    }
}

/// "Host is stopped" resource. Dropping it restarts the host (if we stopped it).
pub struct HostBracket<'h> {
    host: &'h mut dyn HostControl,
    method: Option<ControlMethod>,
    released: bool,
}

impl<'h> HostBracket<'h> {
    /// Stop the host, or get the operator to stop it manually. Declining → ProcessControlFailed.
    pub fn acquire(
        host: &'h mut dyn HostControl,
        operator: &mut dyn Operator,
        settle: Duration,
    ) -> Result<Self> {
        info!("Stopping Home Assistant...");
        let method = host.stop();
        match method {
            Some(m) => info!("Home Assistant stopped via {}", m.as_str()),
            None => {
                warn!("Could not stop Home Assistant automatically");
                if !operator.acknowledge_manual_stop() {
                    return Err(CleanupError::ProcessControlFailed(
                        "host still running and manual stop was not confirmed".to_string(),
                    ));
                }
            }
        }
        if !settle.is_zero() {
            thread::sleep(settle);
        }
        Ok(Self {
            host,
            method,
            released: false,
        })
    }

    pub fn method(&self) -> Option<ControlMethod> {
        self.method
    }

    /// Restart now. Some(ok) if we restarted through a method, None if it was stopped manually.
    pub fn release(mut self) -> Option<bool> {
        self.restart()
    }

    fn restart(&mut self) -> Option<bool> {
        if self.released {
            return None;
        }
        self.released = true;
        info!("Starting Home Assistant...");
        match self.method {
            Some(m) => {
                let ok = self.host.start(m);
                if !ok {
                    error!("Failed to start Home Assistant via {}; start it manually", m.as_str());
                }
                Some(ok)
            }
            None => {
                warn!("Please start Home Assistant manually.");
                None
            }
        }
    }
}

impl Drop for HostBracket<'_> {
    fn drop(&mut self) {
        let _ = self.restart();
    }
}

/// Collected, non-fatal results of the operations run inside a bracket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
    /// Some(ok) restarted via a control method; None — operator must start it.
    pub restarted: Option<bool>,
}

impl BatchReport {
    pub fn all_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Batch<'s, C: DocCache> {
    store: &'s mut RegistryStore<C>,
    report: BatchReport,
}

impl<'s, C: DocCache> Batch<'s, C> {
    /// Run one named operation; its error is logged and recorded, never propagated.
    pub fn run<T, F>(&mut self, name: &str, f: F) -> Option<T>
    where
        F: FnOnce(&mut RegistryStore<C>) -> anyhow::Result<T>,
    {
        match f(&mut *self.store) {
            Ok(v) => {
                self.report.succeeded.push(name.to_string());
                Some(v)
            }
            Err(e) => {
                error!("{} failed: {:#}", name, e);
                self.report.failed.push((name.to_string(), format!("{:#}", e)));
                None
            }
        }
    }
}

/// stop → `body` → always restart → invalidate the registry cache.
pub fn with_host_stopped<C, F>(
    host: &mut dyn HostControl,
    operator: &mut dyn Operator,
    settle: Duration,
    store: &mut RegistryStore<C>,
    body: F,
) -> Result<BatchReport>
where
    C: DocCache,
    F: FnOnce(&mut Batch<'_, C>),
{
    let bracket = HostBracket::acquire(host, operator, settle)?;

    let mut report = {
        let mut batch = Batch {
            store: &mut *store,
            report: BatchReport::default(),
        };
        body(&mut batch);
        batch.report
    };

    report.restarted = bracket.release();
    // HA мог переписать реестры при остановке/старте
    store.invalidate_all();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_per_method() {
        assert_eq!(
            ControlMethod::Supervisor.command(false),
            ("ha", vec!["core", "stop"])
        );
        assert_eq!(
            ControlMethod::Systemd.command(true),
            ("systemctl", vec!["start", "home-assistant@homeassistant"])
        );
        assert_eq!(
            ControlMethod::Docker.command(false),
            ("docker", vec!["stop", "homeassistant"])
        );
    }

    #[test]
    fn missing_binary_is_failure_not_panic() {
        assert!(!run_bounded(
            "definitely-not-a-real-binary-hacleanup",
            &[],
            Duration::from_secs(1)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn timeout_is_failure() {
        let t0 = Instant::now();
        assert!(!run_bounded("sleep", &["5"], Duration::from_millis(200)));
        assert!(t0.elapsed() < Duration::from_secs(4));
    }
}
