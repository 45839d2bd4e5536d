//! Device presence from observed hardware addresses.
//!
//! Every address seen on the wire is either a registered device (its action
//! fires and its alert is sent, at most once per cooldown window) or an
//! unknown one (alerted the first time only). An address is never in both
//! sets; it only moves from unknown to registered through `register`.

use crate::error::{Result, WatchdogError};
use crate::models::{DeviceAction, RegisteredDevice, UnknownDeviceRecord};
use crate::sink::AlertSink;
use mac_address::MacAddress;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::process::Command as AsyncCommand;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(1);

/// Lower-case, colon-separated form of a hardware address.
/// Accepts `:` or `-` separators in any case; anything else yields `None`.
pub fn normalize_mac(raw: &str) -> Option<String> {
    let mac: MacAddress = raw.trim().replace('-', ":").parse().ok()?;
    let b = mac.bytes();
    Some(format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        b[0], b[1], b[2], b[3], b[4], b[5]
    ))
}

pub fn unknown_device_alert(mac: &str) -> String {
    format!("New unknown device detected:\n{mac}")
}

/// What `observe` did with an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Unparseable address, dropped
    Ignored,
    /// Registered device fired (label)
    Triggered(String),
    /// Registered device seen again inside its cooldown window
    Suppressed,
    NewUnknown,
    KnownUnknown,
}

#[derive(Default)]
struct PresenceBook {
    registered: HashMap<String, RegisteredDevice>,
    unknown: HashMap<String, UnknownDeviceRecord>,
}

enum Classified {
    Registered(RegisteredDevice),
    NewUnknown,
    KnownUnknown,
}

pub struct PresenceWatcher<S> {
    book: Mutex<PresenceBook>,
    last_trigger: Mutex<HashMap<String, Instant>>,
    cooldown: Duration,
    sink: S,
}

impl<S: AlertSink> PresenceWatcher<S> {
    pub fn new(sink: S, cooldown: Duration) -> Self {
        Self {
            book: Mutex::new(PresenceBook::default()),
            last_trigger: Mutex::new(HashMap::new()),
            cooldown,
            sink,
        }
    }

    /// Registers a device. Returns `true` when the address was previously
    /// tracked as unknown.
    pub fn register(&self, mut device: RegisteredDevice) -> Result<bool> {
        device.hardware_address = normalize_mac(&device.hardware_address)
            .ok_or_else(|| WatchdogError::InvalidAddress(device.hardware_address.clone()))?;

        let mut book = self.book.lock();
        let was_unknown = book.unknown.remove(&device.hardware_address).is_some();
        info!(
            "[presence] registered {} as '{}'{}",
            device.hardware_address,
            device.label,
            if was_unknown { " (was unknown)" } else { "" }
        );
        book.registered.insert(device.hardware_address.clone(), device);
        Ok(was_unknown)
    }

    pub fn is_registered(&self, mac: &str) -> bool {
        normalize_mac(mac).is_some_and(|m| self.book.lock().registered.contains_key(&m))
    }

    pub fn unknown_devices(&self) -> Vec<UnknownDeviceRecord> {
        let mut records: Vec<_> = self.book.lock().unknown.values().cloned().collect();
        records.sort_by_key(|r| r.first_seen_at);
        records
    }

    /// Handles one address reported by the capture facility
    pub async fn observe(&self, raw: &str) -> Observation {
        let Some(mac) = normalize_mac(raw) else {
            debug!("[presence] dropping malformed address {:?}", raw);
            return Observation::Ignored;
        };

        match self.classify(&mac) {
            Classified::Registered(device) => {
                if !self.claim_trigger(&mac) {
                    debug!("[presence] {} inside cooldown", mac);
                    return Observation::Suppressed;
                }
                info!("[presence] {} detected ({})", device.label, mac);
                run_action(&device);
                self.deliver(&device.alert_message).await;
                Observation::Triggered(device.label)
            }
            Classified::NewUnknown => {
                info!("[presence] new unknown device {}", mac);
                self.deliver(&unknown_device_alert(&mac)).await;
                Observation::NewUnknown
            }
            Classified::KnownUnknown => Observation::KnownUnknown,
        }
    }

    fn classify(&self, mac: &str) -> Classified {
        let mut book = self.book.lock();
        if let Some(device) = book.registered.get(mac) {
            return Classified::Registered(device.clone());
        }
        if book.unknown.contains_key(mac) {
            return Classified::KnownUnknown;
        }
        book.unknown.insert(
            mac.to_string(),
            UnknownDeviceRecord {
                hardware_address: mac.to_string(),
                first_seen_at: OffsetDateTime::now_utc(),
            },
        );
        Classified::NewUnknown
    }

    /// Records a trigger unless the previous one is younger than the cooldown
    fn claim_trigger(&self, mac: &str) -> bool {
        let now = Instant::now();
        let mut last = self.last_trigger.lock();
        if let Some(at) = last.get(mac) {
            if now.duration_since(*at) < self.cooldown {
                return false;
            }
        }
        last.insert(mac.to_string(), now);
        true
    }

    async fn deliver(&self, message: &str) {
        if let Err(e) = self.sink.send(message).await {
            warn!("[presence] alert delivery failed: {}", e);
        }
    }
}

fn run_action(device: &RegisteredDevice) {
    match &device.on_detect {
        DeviceAction::None => {}
        DeviceAction::Callback(callback) => callback(device),
        DeviceAction::Command(template) => spawn_command(template, device),
    }
}

/// Splits the template into arguments, then fills `{mac}` and `{label}` in
/// each of them. Substituted values never add or merge arguments.
fn render_command(
    template: &str,
    device: &RegisteredDevice,
) -> std::result::Result<Vec<String>, shell_words::ParseError> {
    Ok(shell_words::split(template)?
        .into_iter()
        .map(|arg| {
            arg.replace("{mac}", &device.hardware_address)
                .replace("{label}", &device.label)
        })
        .collect())
}

/// Spawns the device command without waiting on the capture path
fn spawn_command(template: &str, device: &RegisteredDevice) {
    let argv = match render_command(template, device) {
        Ok(argv) if !argv.is_empty() => argv,
        Ok(_) => return,
        Err(e) => {
            warn!("[presence] bad command for {}: {}", device.label, e);
            return;
        }
    };

    let spawned = AsyncCommand::new(&argv[0])
        .args(&argv[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();
    match spawned {
        Ok(mut child) => {
            let label = device.label.clone();
            tokio::spawn(async move {
                match child.wait().await {
                    Ok(status) if !status.success() => {
                        warn!("[presence] action for {} exited with {:?}", label, status.code())
                    }
                    Err(e) => warn!("[presence] action for {} failed: {}", label, e),
                    Ok(_) => {}
                }
            });
        }
        Err(e) => warn!("[presence] cannot start action {:?}: {}", argv[0], e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct VecSink(Mutex<Vec<String>>);

    impl AlertSink for VecSink {
        async fn send(&self, message: &str) -> Result<()> {
            self.0.lock().push(message.to_string());
            Ok(())
        }
    }

    fn button(mac: &str, label: &str, hits: Arc<AtomicUsize>) -> RegisteredDevice {
        RegisteredDevice {
            hardware_address: mac.to_string(),
            label: label.to_string(),
            on_detect: DeviceAction::Callback(Arc::new(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })),
            alert_message: format!("{label} pressed"),
        }
    }

    fn commanded(mac: &str, label: &str, template: String) -> RegisteredDevice {
        RegisteredDevice {
            hardware_address: mac.to_string(),
            label: label.to_string(),
            on_detect: DeviceAction::Command(template),
            alert_message: format!("{label} pressed"),
        }
    }

    #[test]
    fn test_label_with_space_stays_one_argument() {
        let device = commanded("78:e1:03:49:ad:c6", "Living Room", String::new());
        let argv = render_command("touch /tmp/{label}", &device).unwrap();
        assert_eq!(argv, vec!["touch", "/tmp/Living Room"]);
    }

    #[test]
    fn test_label_with_apostrophe_renders() {
        let device = commanded("78:e1:03:49:ad:c6", "Mom's button", String::new());
        let argv = render_command("notify --label={label} '{mac} seen'", &device).unwrap();
        assert_eq!(
            argv,
            vec!["notify", "--label=Mom's button", "78:e1:03:49:ad:c6 seen"]
        );
    }

    #[test]
    fn test_unbalanced_template_is_rejected() {
        let device = commanded("78:e1:03:49:ad:c6", "Nivea", String::new());
        assert!(render_command("touch 'unterminated", &device).is_err());
    }

    #[cfg(unix)]
    async fn wait_for_file(path: &std::path::Path) {
        for _ in 0..100 {
            if std::fs::read_to_string(path).is_ok_and(|content| !content.is_empty()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("{} never written", path.display());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_runs_once_per_cooldown_with_substituted_names() {
        let dir = tempfile::tempdir().unwrap();
        let dir_arg = shell_words::quote(&dir.path().to_string_lossy()).into_owned();
        let sink = Arc::new(VecSink::default());
        let watcher = PresenceWatcher::new(sink.clone(), Duration::from_secs(60));

        let labels = ["Living Room", "Mom's button"];
        let macs = ["78:e1:03:49:ad:c6", "fc:a6:67:54:4c:a6"];
        for (label, mac) in labels.iter().zip(macs) {
            let template = format!("sh -c 'echo fired >> \"$1\"' sh {dir_arg}/{{label}}-{{mac}}");
            watcher.register(commanded(mac, label, template)).unwrap();
        }

        for mac in macs {
            assert!(matches!(watcher.observe(mac).await, Observation::Triggered(_)));
            assert_eq!(watcher.observe(mac).await, Observation::Suppressed);
        }

        for (label, mac) in labels.iter().zip(macs) {
            let path = dir.path().join(format!("{label}-{mac}"));
            wait_for_file(&path).await;
            // room for a duplicate run to show up
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(std::fs::read_to_string(&path).unwrap(), "fired\n");
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
        assert_eq!(sink.0.lock().len(), 2);
    }

    #[test]
    fn test_normalize_mac() {
        assert_eq!(normalize_mac("78:E1:03:49:AD:C6").as_deref(), Some("78:e1:03:49:ad:c6"));
        assert_eq!(normalize_mac("fc-a6-67-54-4c-a6").as_deref(), Some("fc:a6:67:54:4c:a6"));
        assert_eq!(normalize_mac(" 18:74:2e:fc:8b:b9\n").as_deref(), Some("18:74:2e:fc:8b:b9"));
        assert_eq!(normalize_mac("18:74:2e:fc:8b"), None);
        assert_eq!(normalize_mac("zz:74:2e:fc:8b:b9"), None);
        assert_eq!(normalize_mac(""), None);
    }

    #[tokio::test]
    async fn test_mixed_case_capture_matches_registered_device() {
        let sink = Arc::new(VecSink::default());
        let watcher = PresenceWatcher::new(sink.clone(), DEFAULT_COOLDOWN);
        let hits = Arc::new(AtomicUsize::new(0));
        watcher.register(button("78:e1:03:49:ad:c6", "Nivea", hits.clone())).unwrap();

        let seen = watcher.observe("78:E1:03:49:AD:C6").await;
        assert_eq!(seen, Observation::Triggered("Nivea".into()));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(*sink.0.lock(), vec!["Nivea pressed".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_inside_cooldown_triggers_once() {
        let sink = Arc::new(VecSink::default());
        let watcher = PresenceWatcher::new(sink.clone(), DEFAULT_COOLDOWN);
        let hits = Arc::new(AtomicUsize::new(0));
        watcher.register(button("fc:a6:67:54:4c:a6", "Energy", hits.clone())).unwrap();

        for _ in 0..5 {
            watcher.observe("fc:a6:67:54:4c:a6").await;
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(sink.0.lock().len(), 1);

        tokio::time::advance(Duration::from_millis(1100)).await;
        assert_eq!(
            watcher.observe("fc:a6:67:54:4c:a6").await,
            Observation::Triggered("Energy".into())
        );
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_device_alerted_once() {
        let sink = Arc::new(VecSink::default());
        let watcher = PresenceWatcher::new(sink.clone(), DEFAULT_COOLDOWN);

        assert_eq!(watcher.observe("00:11:22:33:44:55").await, Observation::NewUnknown);
        assert_eq!(watcher.observe("00:11:22:33:44:55").await, Observation::KnownUnknown);
        assert_eq!(watcher.observe("00-11-22-33-44-55").await, Observation::KnownUnknown);

        let sent = sink.0.lock();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("00:11:22:33:44:55"));
        assert_eq!(watcher.unknown_devices().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_address_is_dropped_silently() {
        let sink = Arc::new(VecSink::default());
        let watcher = PresenceWatcher::new(sink.clone(), DEFAULT_COOLDOWN);

        assert_eq!(watcher.observe("not a mac").await, Observation::Ignored);
        assert!(sink.0.lock().is_empty());
        assert!(watcher.unknown_devices().is_empty());
    }

    #[tokio::test]
    async fn test_register_moves_address_out_of_unknown_set() {
        let sink = Arc::new(VecSink::default());
        let watcher = PresenceWatcher::new(sink.clone(), DEFAULT_COOLDOWN);
        watcher.observe("aa:bb:cc:dd:ee:ff").await;
        assert!(!watcher.is_registered("aa:bb:cc:dd:ee:ff"));

        let hits = Arc::new(AtomicUsize::new(0));
        let moved = watcher.register(button("AA:BB:CC:DD:EE:FF", "Door", hits.clone())).unwrap();
        assert!(moved);
        assert!(watcher.is_registered("aa:bb:cc:dd:ee:ff"));
        assert!(watcher.unknown_devices().is_empty());

        assert_eq!(watcher.observe("aa:bb:cc:dd:ee:ff").await, Observation::Triggered("Door".into()));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_register_rejects_invalid_address() {
        let watcher = PresenceWatcher::new(Arc::new(VecSink::default()), DEFAULT_COOLDOWN);
        let device = button("garbage", "Broken", Arc::new(AtomicUsize::new(0)));
        assert!(matches!(watcher.register(device), Err(WatchdogError::InvalidAddress(_))));
    }
}
