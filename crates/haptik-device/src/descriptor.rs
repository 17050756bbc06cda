use std::collections::HashMap;

use tracing::warn;

/// Static per-device-family metadata, resolved once at adapter construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureDescriptor {
    /// Human-readable device name.
    pub display_name: String,
    /// Number of independently addressable output channels.
    pub feature_count: usize,
}

impl FeatureDescriptor {
    pub fn new(display_name: impl Into<String>, feature_count: usize) -> Self {
        Self {
            display_name: display_name.into(),
            feature_count,
        }
    }
}

/// Read-only table mapping a name-embedded type code to its descriptor.
///
/// Built once at startup and shared by every adapter instance of the family.
#[derive(Debug, Clone)]
pub struct DescriptorTable {
    entries: HashMap<u8, FeatureDescriptor>,
    fallback: FeatureDescriptor,
}

impl DescriptorTable {
    /// Descriptor table for the Cueme device family.
    ///
    /// The fallback is the single-feature variant, the most conservative
    /// choice for unrecognized hardware.
    pub fn cueme() -> Self {
        let mut entries = HashMap::new();
        entries.insert(0, FeatureDescriptor::new("Cueme Classic", 1));
        entries.insert(1, FeatureDescriptor::new("Cueme Band", 2));
        entries.insert(2, FeatureDescriptor::new("Cueme Sleeve", 4));
        entries.insert(3, FeatureDescriptor::new("Cueme Vest", 6));
        Self {
            entries,
            fallback: FeatureDescriptor::new("Cueme Classic", 1),
        }
    }

    /// Resolve a descriptor from a device name of the form `Cueme_<code>`.
    ///
    /// Unrecognized names log a warning and resolve to the fallback variant.
    pub fn resolve(&self, device_name: &str) -> FeatureDescriptor {
        match parse_type_code(device_name).and_then(|code| self.entries.get(&code)) {
            Some(descriptor) => descriptor.clone(),
            None => {
                warn!(
                    device_name,
                    fallback = %self.fallback.display_name,
                    "unrecognized device type code, using fallback descriptor"
                );
                self.fallback.clone()
            }
        }
    }
}

fn parse_type_code(device_name: &str) -> Option<u8> {
    let (_, code) = device_name.rsplit_once('_')?;
    code.parse().ok()
}
