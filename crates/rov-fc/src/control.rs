use crate::FcError;

pub const CHANNEL_COUNT: usize = 18;

/// RC_CHANNELS_OVERRIDE value meaning "leave this channel alone".
pub const NO_OVERRIDE: u16 = u16::MAX;

/// One MANUAL_CONTROL frame. Construct through [`ManualInput::new`] so the
/// axis ranges hold before anything reaches the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManualInput {
    pub x: i16,
    pub y: i16,
    pub z: i16,
    pub r: i16,
    pub buttons: u16,
}

impl ManualInput {
    /// x, y, r in [-1000, 1000]; z in [0, 1000].
    pub fn new(x: i32, y: i32, z: i32, r: i32, buttons: u16) -> Result<Self, FcError> {
        Ok(Self {
            x: axis("x", x, -1000, 1000)?,
            y: axis("y", y, -1000, 1000)?,
            z: axis("z", z, 0, 1000)?,
            r: axis("r", r, -1000, 1000)?,
            buttons,
        })
    }

    /// Sticks centred, throttle at mid-point, no buttons.
    pub fn neutral() -> Self {
        Self { x: 0, y: 0, z: 500, r: 0, buttons: 0 }
    }
}

fn axis(name: &'static str, value: i32, min: i32, max: i32) -> Result<i16, FcError> {
    if value < min || value > max {
        return Err(FcError::InvalidControlValue { axis: name, value, min, max });
    }
    Ok(value as i16)
}

/// Full 18-channel override frame.
///
/// Channels left at [`NO_OVERRIDE`] are not overridden by this frame; the
/// vehicle keeps whatever it had on them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOverride([u16; CHANNEL_COUNT]);

impl ChannelOverride {
    pub fn none() -> Self {
        Self([NO_OVERRIDE; CHANNEL_COUNT])
    }

    /// Override only `channel` (1-based).
    pub fn single(channel: i32, pwm: u16) -> Result<Self, FcError> {
        let mut o = Self::none();
        o.set(channel, pwm)?;
        Ok(o)
    }

    pub fn set(&mut self, channel: i32, pwm: u16) -> Result<(), FcError> {
        if channel < 1 || channel > CHANNEL_COUNT as i32 {
            return Err(FcError::InvalidChannel { channel, max: CHANNEL_COUNT });
        }
        self.0[(channel - 1) as usize] = pwm;
        Ok(())
    }

    pub fn values(&self) -> &[u16; CHANNEL_COUNT] {
        &self.0
    }
}

impl Default for ChannelOverride {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_override_touches_one_channel() {
        for ch in 1..=CHANNEL_COUNT as i32 {
            let o = ChannelOverride::single(ch, 1600).unwrap();
            for (i, v) in o.values().iter().enumerate() {
                if i == (ch - 1) as usize {
                    assert_eq!(*v, 1600);
                } else {
                    assert_eq!(*v, NO_OVERRIDE);
                }
            }
        }
    }

    #[test]
    fn channel_out_of_range() {
        for ch in [-1, 0, 19, 100] {
            let err = ChannelOverride::single(ch, 1500).unwrap_err();
            assert!(matches!(err, FcError::InvalidChannel { channel, .. } if channel == ch));
        }
    }

    #[test]
    fn manual_ranges() {
        assert!(ManualInput::new(1000, -1000, 0, 1000, 0).is_ok());
        assert!(ManualInput::new(0, 0, 1000, -1000, 0).is_ok());

        let err = ManualInput::new(1500, 0, 0, 0, 0).unwrap_err();
        assert!(matches!(err, FcError::InvalidControlValue { axis: "x", value: 1500, .. }));

        let err = ManualInput::new(0, 0, -1, 0, 0).unwrap_err();
        assert!(matches!(err, FcError::InvalidControlValue { axis: "z", .. }));

        let err = ManualInput::new(0, 0, 0, -1001, 0).unwrap_err();
        assert!(matches!(err, FcError::InvalidControlValue { axis: "r", .. }));
    }
}
