//! Static `device_id -> core topology` table for known mobile SoCs.

use crate::affinity::CoreList;
use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Core topology and nominal clocks for one known device.
#[derive(Clone, Debug)]
pub struct DeviceSpec {
    pub alias: &'static str,
    pub small_cores: CoreList,
    pub mid_cores: CoreList,
    pub big_cores: CoreList,
    /// `[small, mid, big]` clocks in MHz; `0` means unknown, matching the
    /// original's `0.0` "Unknown" sentinel.
    pub frequencies_mhz: [u32; 3],
}

static DEVICE_SPECS: Lazy<HashMap<&'static str, DeviceSpec>> = Lazy::new(|| {
    HashMap::from([
        (
            "3A021JEHN02756",
            DeviceSpec {
                alias: "Pixel_7a",
                small_cores: CoreList::new([0, 1, 2, 3]),
                mid_cores: CoreList::new([4, 5]),
                big_cores: CoreList::new([6, 7]),
                frequencies_mhz: [1803, 2348, 2850],
            },
        ),
        (
            "9b034f1b",
            DeviceSpec {
                alias: "OnePlus",
                small_cores: CoreList::new([0, 1, 2]),
                mid_cores: CoreList::new([3, 4, 5, 6]),
                big_cores: CoreList::new([7]),
                frequencies_mhz: [0, 0, 0],
            },
        ),
        (
            "RFCT80DAADN",
            DeviceSpec {
                alias: "Samsung-new",
                small_cores: CoreList::new([0, 1, 2, 3]),
                mid_cores: CoreList::new([4, 5, 6]),
                big_cores: CoreList::new([7]),
                frequencies_mhz: [1824, 2515, 2803],
            },
        ),
        (
            "ZY22FLDDK7",
            DeviceSpec {
                alias: "Motorola",
                small_cores: CoreList::new([4, 5, 6, 7]),
                mid_cores: CoreList::new([]),
                big_cores: CoreList::new([0, 1, 2, 3]),
                frequencies_mhz: [0, 0, 0],
            },
        ),
        (
            "ce0717178d7758b00b7e",
            DeviceSpec {
                alias: "Samsung-old",
                small_cores: CoreList::new([0, 1, 2, 3]),
                mid_cores: CoreList::new([]),
                big_cores: CoreList::new([4, 5, 6, 7]),
                frequencies_mhz: [1900, 0, 2361],
            },
        ),
        (
            "jetson",
            DeviceSpec {
                alias: "Jetson Orin",
                small_cores: CoreList::new([0, 1, 2, 3, 4, 5]),
                mid_cores: CoreList::new([]),
                big_cores: CoreList::new([]),
                frequencies_mhz: [0, 0, 0],
            },
        ),
    ])
});

/// Looks up the topology for `device_id`. An absent id is a user-visible
/// error, not a silent default — the CLI surfaces it as a configuration
/// error (exit code 1, per the device-spec table's contract).
pub fn lookup(device_id: &str) -> Result<&'static DeviceSpec> {
    DEVICE_SPECS
        .get(device_id)
        .ok_or_else(|| Error::UnknownDevice(device_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_device_resolves() {
        let spec = lookup("3A021JEHN02756").unwrap();
        assert_eq!(spec.alias, "Pixel_7a");
        assert_eq!(spec.big_cores.as_slice(), &[6, 7]);
    }

    #[test]
    fn unknown_device_is_a_reported_error() {
        match lookup("does-not-exist") {
            Err(Error::UnknownDevice(id)) => assert_eq!(id, "does-not-exist"),
            other => panic!("expected UnknownDevice, got {other:?}"),
        }
    }

    #[test]
    fn device_with_no_mid_cores_reports_empty_list() {
        let spec = lookup("ZY22FLDDK7").unwrap();
        assert!(spec.mid_cores.is_empty());
    }
}
