use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Clone)]
pub struct RegistryMetrics {
    pub devices_registered: IntGauge,
    pub config_writes: IntCounter,
    pub config_write_failures: IntCounter,
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub dev: RegistryMetrics,
}

impl MetricsHub {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();
        let devices_registered = IntGauge::new(
            "brew_devices_registered",
            "Devices holding a non-empty alias across all families",
        )
        .map_err(|e| format!("metrics init error: {e}"))?;
        let config_writes =
            IntCounter::new("brew_config_writes_total", "Successful configuration rewrites")
                .map_err(|e| format!("metrics init error: {e}"))?;
        let config_write_failures = IntCounter::new(
            "brew_config_write_failures_total",
            "Configuration rewrites that failed and were discarded",
        )
        .map_err(|e| format!("metrics init error: {e}"))?;
        let dev = RegistryMetrics {
            devices_registered,
            config_writes,
            config_write_failures,
        };
        registry
            .register(Box::new(dev.devices_registered.clone()))
            .map_err(|e| format!("metrics registration error: {e}"))?;
        registry
            .register(Box::new(dev.config_writes.clone()))
            .map_err(|e| format!("metrics registration error: {e}"))?;
        registry
            .register(Box::new(dev.config_write_failures.clone()))
            .map_err(|e| format!("metrics registration error: {e}"))?;
        Ok(Self { registry, dev })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}
