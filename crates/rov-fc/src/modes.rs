use std::collections::BTreeMap;

use crate::link::VehicleKind;
use crate::FcError;

const ARDUSUB: &[(&str, u32)] = &[
    ("STABILIZE", 0),
    ("ACRO", 1),
    ("ALT_HOLD", 2),
    ("AUTO", 3),
    ("GUIDED", 4),
    ("CIRCLE", 7),
    ("SURFACE", 9),
    ("POSHOLD", 16),
    ("MANUAL", 19),
    ("MOTOR_DETECT", 20),
    ("SURFTRAK", 21),
];

const ARDUCOPTER: &[(&str, u32)] = &[
    ("STABILIZE", 0),
    ("ACRO", 1),
    ("ALT_HOLD", 2),
    ("AUTO", 3),
    ("GUIDED", 4),
    ("LOITER", 5),
    ("RTL", 6),
    ("CIRCLE", 7),
    ("LAND", 9),
    ("DRIFT", 11),
    ("SPORT", 13),
    ("FLIP", 14),
    ("AUTOTUNE", 15),
    ("POSHOLD", 16),
    ("BRAKE", 17),
    ("THROW", 18),
    ("AVOID_ADSB", 19),
    ("GUIDED_NOGPS", 20),
    ("SMART_RTL", 21),
];

const ARDUROVER: &[(&str, u32)] = &[
    ("MANUAL", 0),
    ("ACRO", 1),
    ("STEERING", 3),
    ("HOLD", 4),
    ("LOITER", 5),
    ("FOLLOW", 6),
    ("SIMPLE", 7),
    ("AUTO", 10),
    ("RTL", 11),
    ("SMART_RTL", 12),
    ("GUIDED", 15),
];

/// Mode name -> custom mode id for one firmware family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeTable {
    modes: BTreeMap<String, u32>,
}

impl ModeTable {
    pub fn ardusub() -> Self {
        Self::from_pairs(ARDUSUB)
    }

    pub fn arducopter() -> Self {
        Self::from_pairs(ARDUCOPTER)
    }

    pub fn ardurover() -> Self {
        Self::from_pairs(ARDUROVER)
    }

    /// Unknown vehicle types fall back to the ArduSub table.
    pub fn for_vehicle(kind: VehicleKind) -> Self {
        match kind {
            VehicleKind::Sub => Self::ardusub(),
            VehicleKind::Copter => Self::arducopter(),
            VehicleKind::Rover => Self::ardurover(),
            VehicleKind::Other(_) => Self::ardusub(),
        }
    }

    pub fn from_map(map: &BTreeMap<String, u32>) -> Self {
        let modes = map
            .iter()
            .map(|(name, id)| (name.to_ascii_uppercase(), *id))
            .collect();
        Self { modes }
    }

    fn from_pairs(pairs: &[(&str, u32)]) -> Self {
        let modes = pairs.iter().map(|(n, id)| (n.to_string(), *id)).collect();
        Self { modes }
    }

    pub fn lookup(&self, name: &str) -> Result<u32, FcError> {
        let key = name.trim().to_ascii_uppercase();
        self.modes.get(&key).copied().ok_or_else(|| FcError::UnknownMode {
            mode: name.to_string(),
            valid: self.names(),
        })
    }

    /// Alphabetically first name registered for `id`.
    pub fn name_of(&self, id: u32) -> Option<&str> {
        self.modes
            .iter()
            .find(|(_, v)| **v == id)
            .map(|(name, _)| name.as_str())
    }

    pub fn names(&self) -> Vec<String> {
        self.modes.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.modes.iter().map(|(n, id)| (n.as_str(), *id))
    }
}

impl Default for ModeTable {
    fn default() -> Self {
        Self::ardusub()
    }
}
