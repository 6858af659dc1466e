use crate::serialize::{hex_u64, hex_u64_de};
use crate::{ConfigError, MemoryMap};
use serde::{Deserialize, Serialize};

/// A single register write performed right after the debug connection
/// is established.
///
/// Typically used to disable a watchdog or to keep the debug unit
/// clocked in low-power modes, so that halted-mode programming is
/// reliable. Failure to apply it is reported but not fatal: some chips
/// work without it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterWrite {
    /// Address of the register to write.
    #[serde(serialize_with = "hex_u64", deserialize_with = "hex_u64_de")]
    pub address: u64,
    /// The value to write.
    #[serde(serialize_with = "hex_u64", deserialize_with = "hex_u64_de")]
    pub value: u64,
}

/// Everything the engine needs to know about one target chip: its
/// memory map, vendor identity and the optional connect-time fix-up.
///
/// A target definition is pure data. Adding support for a new chip
/// means adding a new definition, not a new type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetDefinition {
    /// The name of the target.
    pub name: String,
    /// The vendor of the chip.
    pub vendor: String,
    /// The memory map of the target.
    pub memory_map: MemoryMap,
    /// Register write applied once after connecting, before any
    /// programming starts.
    #[serde(default)]
    pub connect_fixup: Option<RegisterWrite>,
}

impl TargetDefinition {
    /// Validate the definition, including every flash algorithm it carries.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // The memory map itself was validated at construction.
        for region in self.memory_map.flash_regions() {
            region.algorithm.validate()?;
        }
        Ok(())
    }

    /// Parse a target definition from its YAML description.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let definition: TargetDefinition = serde_yaml::from_str(yaml)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Serialize the definition to YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod test {
    use crate::builtin;

    #[test]
    fn yaml_round_trip() {
        let target = builtin::get("stm32f103xb").unwrap();
        let yaml = target.to_yaml().unwrap();
        let parsed = super::TargetDefinition::from_yaml(&yaml).unwrap();
        assert_eq!(target, parsed);
    }
}
