use tracing::warn;

use crate::config::PreprocConfig;

const MEMINFO_PATH: &str = "/proc/meminfo";
const FALLBACK_MEMORY_BYTES: u64 = 16 * 1024 * 1024 * 1024;

/// Total memory the partition size is derived from.
pub fn total_memory_bytes(config: &PreprocConfig) -> u64 {
    if let Some(bytes) = config.memory_bytes {
        return bytes;
    }

    match std::fs::read_to_string(MEMINFO_PATH)
        .ok()
        .and_then(|raw| parse_mem_total(&raw))
    {
        Some(bytes) => bytes,
        None => {
            warn!(
                fallback_bytes = FALLBACK_MEMORY_BYTES,
                "Could not read MemTotal; using fallback memory size"
            );
            FALLBACK_MEMORY_BYTES
        }
    }
}

pub fn partition_size_bytes(total_bytes: u64, fraction: f64) -> u64 {
    let size = (fraction * total_bytes as f64).floor() as u64;
    size.max(1)
}

fn parse_mem_total(meminfo: &str) -> Option<u64> {
    let line = meminfo.lines().find(|line| line.starts_with("MemTotal:"))?;
    let mut parts = line["MemTotal:".len()..].split_whitespace();
    let value: u64 = parts.next()?.parse().ok()?;
    let multiplier = match parts.next() {
        Some(unit) if unit.eq_ignore_ascii_case("kb") => 1024,
        Some(unit) if unit.eq_ignore_ascii_case("mb") => 1024 * 1024,
        None => 1,
        Some(_) => return None,
    };
    value.checked_mul(multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kilobyte_mem_total() {
        let raw = "MemTotal:       16318412 kB\nMemFree:         1000 kB\n";
        assert_eq!(parse_mem_total(raw), Some(16_318_412 * 1024));
    }

    #[test]
    fn missing_mem_total_is_none() {
        assert_eq!(parse_mem_total("MemFree: 10 kB"), None);
        assert_eq!(parse_mem_total("MemTotal: lots kB"), None);
    }

    #[test]
    fn config_override_wins() {
        let config = PreprocConfig {
            memory_bytes: Some(4096),
            ..PreprocConfig::default()
        };
        assert_eq!(total_memory_bytes(&config), 4096);
    }

    #[test]
    fn partition_size_is_fraction_with_floor() {
        assert_eq!(partition_size_bytes(1_000_000_000, 0.05), 50_000_000);
        assert_eq!(partition_size_bytes(10, 0.05), 1);
    }
}
