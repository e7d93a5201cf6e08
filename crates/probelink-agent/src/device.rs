//! Device identity and hardware description.
//!
//! The device id must be stable across restarts so the relay can treat a
//! reconnecting agent as the same device. It is derived from traits of the
//! host rather than generated at random.

use probelink_proto::DeviceInfo;
use sha2::{Digest, Sha256};

/// Derives a stable fingerprint for this host.
///
/// SHA-256 over hostname, OS, architecture, and user name, truncated to
/// 40 hex characters. Two agents on the same host and account collide by
/// design of the inputs.
pub fn device_id() -> String {
    let mut hasher = Sha256::new();
    hasher.update(hostname().as_bytes());
    hasher.update(b"|");
    hasher.update(std::env::consts::OS.as_bytes());
    hasher.update(b"|");
    hasher.update(std::env::consts::ARCH.as_bytes());
    hasher.update(b"|");
    hasher.update(user_name().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..40].to_string()
}

/// Collects the full device description announced to the relay.
pub fn collect(agent_version: &str) -> DeviceInfo {
    DeviceInfo {
        id: device_id(),
        device_name: hostname(),
        device_model: device_model(),
        operating_system: std::env::consts::OS.to_string(),
        processor_type: std::env::consts::ARCH.to_string(),
        system_memory_size: system_memory_mib(),
        graphics_device_name: "none".to_string(),
        agent_version: agent_version.to_string(),
        platform: std::env::consts::OS.to_string(),
        timestamp: timestamp_seconds(),
    }
}

/// Wall-clock timestamp at second precision, for device announcements.
pub fn timestamp_seconds() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Wall-clock timestamp at millisecond precision, for log records.
pub fn timestamp_millis() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

fn hostname() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

fn user_name() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

fn device_model() -> String {
    std::fs::read_to_string("/sys/devices/virtual/dmi/id/product_name")
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| std::env::consts::ARCH.to_string())
}

/// Total system memory in MiB, or 0 when it cannot be determined.
fn system_memory_mib() -> u64 {
    let Ok(meminfo) = std::fs::read_to_string("/proc/meminfo") else {
        return 0;
    };
    parse_mem_total_mib(&meminfo).unwrap_or(0)
}

fn parse_mem_total_mib(meminfo: &str) -> Option<u64> {
    let line = meminfo.lines().find(|l| l.starts_with("MemTotal:"))?;
    let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kib / 1024)
}
