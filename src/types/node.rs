//! Node identity types.

/// Bluetooth identity advertised by the node, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BleInfo {
    /// MAC address, formatted as lowercase hex pairs separated by colons.
    pub mac: String,
    /// Advertised BLE name.
    pub name: Option<String>,
}

/// Identity returned by the node-info query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    /// 32-bit node number assigned on the mesh.
    pub node_num: u32,
    /// Firmware version string (e.g. "2.2.27").
    pub firmware: String,
    /// Hardware model (e.g. "HELTEC_V3").
    pub hw_model: String,
    /// Long name configured on the node.
    pub node_name: Option<String>,
    /// Bluetooth identity, if the node advertises one.
    pub ble: Option<BleInfo>,
}

impl NodeInfo {
    /// Returns the canonical node id string ("!" followed by the node
    /// number in lowercase hex).
    #[must_use]
    pub fn node_id(&self) -> String {
        format!("!{:08x}", self.node_num)
    }
}

/// Channel configuration returned by the channels query.
///
/// The first entry is the primary (active) channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelList {
    /// Channel names in slot order.
    pub names: Vec<String>,
}

impl ChannelList {
    /// Returns the active (primary) channel name, if any channel exists.
    #[must_use]
    pub fn active(&self) -> Option<&str> {
        self.names.first().map(String::as_str)
    }

    /// Returns true if the list contains the given name.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}
