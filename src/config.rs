use crate::utils::errors::FootprintError;

/// Maximum power draw of the reference machine in watts
pub const DEFAULT_MAX_POWER_WATTS: f64 = 11.0;
/// German electricity mix 2020
pub const DEFAULT_KG_CO2_PER_KWH: f64 = 0.311;

/// Hardware and grid constants, read once at startup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FootprintConfig {
    max_power_watts: f64,
    cpu_count: usize,
    kg_co2_per_kwh: f64,
}

impl FootprintConfig {
    pub fn new(
        max_power_watts: f64,
        cpu_count: usize,
        kg_co2_per_kwh: f64,
    ) -> Result<Self, FootprintError> {
        if !max_power_watts.is_finite() || max_power_watts <= 0.0 {
            return Err(FootprintError::InvalidArgument(format!(
                "max power must be a positive number of watts, got {}",
                max_power_watts
            )));
        }
        if cpu_count == 0 {
            return Err(FootprintError::InvalidArgument(
                "cpu count must be at least 1".to_string(),
            ));
        }
        if !kg_co2_per_kwh.is_finite() || kg_co2_per_kwh < 0.0 {
            return Err(FootprintError::InvalidArgument(format!(
                "carbon intensity must be a non-negative number of kgCO2/kWh, got {}",
                kg_co2_per_kwh
            )));
        }
        Ok(Self {
            max_power_watts,
            cpu_count,
            kg_co2_per_kwh,
        })
    }

    /// Defaults of the reference machine with the given number of CPUs.
    #[cfg(test)]
    pub fn with_cpu_count(cpu_count: usize) -> Result<Self, FootprintError> {
        Self::new(DEFAULT_MAX_POWER_WATTS, cpu_count, DEFAULT_KG_CO2_PER_KWH)
    }

    pub fn max_power_watts(&self) -> f64 {
        self.max_power_watts
    }

    pub fn cpu_count(&self) -> usize {
        self.cpu_count
    }

    pub fn kg_co2_per_kwh(&self) -> f64 {
        self.kg_co2_per_kwh
    }

    /// Grams of CO2 per watt-second
    pub fn g_co2_per_ws(&self) -> f64 {
        self.kg_co2_per_kwh / 3600.0
    }
}
