use serde::Serialize;

/// Static facts about the running application and device.
///
/// Supplied once at startup by the host application (native version and
/// device APIs live outside this crate) and assumed constant for the
/// lifetime of the process.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceFacts {
    pub app_version: String,
    pub build_number: u64,
    pub brand: String,
    pub model: String,
    pub device_name: Option<String>,
    pub manufacturer: Option<String>,
    pub system_name: String,
    pub system_version: String,
    pub api_level: Option<u32>,
    pub total_memory: Option<u64>,
}

impl DeviceFacts {
    /// Facts that can be derived without any platform API: the OS family
    /// as `system_name`, everything else left empty.
    pub fn from_host() -> Self {
        DeviceFacts {
            system_name: std::env::consts::OS.to_string(),
            ..DeviceFacts::default()
        }
    }

    /// The `deviceInformation` block attached to every record.
    pub fn information(&self) -> DeviceInformation {
        DeviceInformation {
            brand: self.brand.clone(),
            model_name: self.model.clone(),
            device_name: self.device_name.clone().unwrap_or_default(),
            manufacturer: self.manufacturer.clone().unwrap_or_default(),
            system_name: self.system_name.clone(),
            system_version: self.system_version.clone(),
            api_level: self.api_level,
            total_memory: self.total_memory,
        }
    }
}

/// Parse a platform build number, falling back to `0` when it is not a
/// plain integer.
pub fn parse_build_number(raw: &str) -> u64 {
    raw.trim().parse().unwrap_or(0)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInformation {
    pub brand: String,
    pub model_name: String,
    pub device_name: String,
    pub manufacturer: String,
    pub system_name: String,
    pub system_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_level: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_memory: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_number_falls_back_to_zero() {
        assert_eq!(parse_build_number("412"), 412);
        assert_eq!(parse_build_number(" 7 "), 7);
        assert_eq!(parse_build_number("1.2.3"), 0);
        assert_eq!(parse_build_number(""), 0);
    }

    #[test]
    fn information_fills_optional_names_with_empty_strings() {
        let facts = DeviceFacts {
            brand: "acme".into(),
            model: "x1".into(),
            api_level: Some(33),
            ..DeviceFacts::default()
        };
        let info = facts.information();
        assert_eq!(info.model_name, "x1");
        assert_eq!(info.device_name, "");
        assert_eq!(info.api_level, Some(33));

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["modelName"], "x1");
        assert!(json.get("totalMemory").is_none());
    }
}
