use std::sync::LazyLock;

use ffmpeg_pump::ConverterConfig;

const CACHE_CAPACITY_ENV: &str = "MEDIA_PUMP_CACHE_CAPACITY";

pub struct PumpConfig {
    cache_capacity: usize,
}

impl PumpConfig {
    pub fn new(cache_capacity: usize) -> Self {
        Self { cache_capacity }
    }

    fn from_env() -> Self {
        let default = ConverterConfig::default().scaler_capacity;
        let capacity = match std::env::var(CACHE_CAPACITY_ENV) {
            Ok(value) => value.trim().parse().unwrap_or_else(|_| {
                log::warn!("ignoring {}={:?}, using {}", CACHE_CAPACITY_ENV, value, default);
                default
            }),
            Err(_) => default,
        };
        Self::new(capacity)
    }

    pub fn cache_capacity(&self) -> usize {
        self.cache_capacity
    }

    pub fn converter_config(&self) -> ConverterConfig {
        ConverterConfig {
            scaler_capacity: self.cache_capacity,
            resampler_capacity: self.cache_capacity,
        }
    }
}

pub fn config() -> &'static PumpConfig {
    static CONFIG: LazyLock<PumpConfig> = LazyLock::new(PumpConfig::from_env);
    &CONFIG
}
