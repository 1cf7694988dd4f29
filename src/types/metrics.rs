//! Link and device telemetry types.

/// Radio link quality as last observed by the node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkMetrics {
    /// Received signal strength in dBm.
    pub rssi: Option<f32>,
    /// Signal-to-noise ratio in dB.
    pub snr: Option<f32>,
    /// Airtime utilisation in percent (TX duty cycle).
    pub air_util: Option<f32>,
}

/// Device health telemetry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceMetrics {
    /// Battery charge level in percent. Absent on mains-powered nodes.
    pub battery_level: Option<f32>,
    /// Battery voltage in volts.
    pub voltage: Option<f32>,
    /// Temperature in degrees Celsius.
    pub temperature: Option<f32>,
    /// Uptime in seconds.
    pub uptime_secs: Option<u32>,
}
