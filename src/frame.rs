use crate::error::FrameError;
use crate::orientation::OrientationSample;
use serde::{Deserialize, Serialize};

/// Size of one encoded pose frame: six little-endian f64 values
pub const FRAME_LEN: usize = 6 * std::mem::size_of::<f64>();

/// Encoded pose frame as it goes on the wire
pub type EncodedFrame = [u8; FRAME_LEN];

/// One 6-DoF pose: position followed by orientation in degrees
///
/// Field order matches the wire layout:
///
/// | Offset | Field |
/// |---|---|
/// | 0  | x |
/// | 8  | y |
/// | 16 | z |
/// | 24 | yaw |
/// | 32 | pitch |
/// | 40 | roll |
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseFrame {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

impl PoseFrame {
    /// Orientation-only pose; this tracker has no positional hardware
    pub fn from_orientation(yaw: f64, pitch: f64, roll: f64) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            yaw,
            pitch,
            roll,
        }
    }

    fn fields(&self) -> [f64; 6] {
        [self.x, self.y, self.z, self.yaw, self.pitch, self.roll]
    }

    /// Encode into the fixed 48-byte wire frame
    pub fn encode(&self) -> EncodedFrame {
        let mut buf = [0u8; FRAME_LEN];
        for (slot, value) in buf.chunks_exact_mut(8).zip(self.fields()) {
            slot.copy_from_slice(&value.to_le_bytes());
        }
        buf
    }

    /// Decode a 48-byte wire frame
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() != FRAME_LEN {
            return Err(FrameError::InvalidLength {
                expected: FRAME_LEN,
                actual: bytes.len(),
            });
        }

        let mut fields = [0.0f64; 6];
        for (field, chunk) in fields.iter_mut().zip(bytes.chunks_exact(8)) {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            *field = f64::from_le_bytes(raw);
        }

        let [x, y, z, yaw, pitch, roll] = fields;
        Ok(Self {
            x,
            y,
            z,
            yaw,
            pitch,
            roll,
        })
    }
}

impl From<OrientationSample> for PoseFrame {
    fn from(sample: OrientationSample) -> Self {
        Self::from_orientation(sample.yaw, sample.pitch, sample.roll)
    }
}

/// Encode a pose given as its six wire fields
pub fn encode_frame(x: f64, y: f64, z: f64, yaw: f64, pitch: f64, roll: f64) -> EncodedFrame {
    PoseFrame {
        x,
        y,
        z,
        yaw,
        pitch,
        roll,
    }
    .encode()
}

/// Inverse of [`encode_frame`], for receivers and interoperability checks
pub fn decode_frame(bytes: &[u8]) -> Result<PoseFrame, FrameError> {
    PoseFrame::decode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout_is_little_endian_in_field_order() {
        let frame = encode_frame(1.0, 2.0, 3.0, 10.5, -20.25, 0.0);

        assert_eq!(frame.len(), 48);
        assert_eq!(&frame[0..8], &1.0f64.to_le_bytes());
        assert_eq!(&frame[8..16], &2.0f64.to_le_bytes());
        assert_eq!(&frame[16..24], &3.0f64.to_le_bytes());
        assert_eq!(&frame[24..32], &10.5f64.to_le_bytes());
        assert_eq!(&frame[32..40], &(-20.25f64).to_le_bytes());
        assert_eq!(&frame[40..48], &0.0f64.to_le_bytes());
    }

    #[test]
    fn test_decode_recovers_fields() {
        let cases = [
            [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            [-1.5, 2.25, -0.0, 179.999, -89.5, 360.0],
            [f64::MAX, f64::MIN_POSITIVE, -1e-300, 1e300, -123456.789, 42.0],
        ];

        for [x, y, z, yaw, pitch, roll] in cases {
            let decoded = decode_frame(&encode_frame(x, y, z, yaw, pitch, roll)).unwrap();
            assert_eq!(decoded.fields(), [x, y, z, yaw, pitch, roll]);
        }
    }

    #[test]
    fn test_orientation_sample_encodes_zero_position() {
        let sample = OrientationSample {
            yaw: 12.0,
            pitch: -3.0,
            roll: 45.0,
        };
        let bytes = PoseFrame::from(sample).encode();
        let decoded = decode_frame(&bytes).unwrap();

        assert_eq!(decoded.x, 0.0);
        assert_eq!(decoded.y, 0.0);
        assert_eq!(decoded.z, 0.0);
        assert_eq!(decoded.yaw, 12.0);
        assert_eq!(decoded.pitch, -3.0);
        assert_eq!(decoded.roll, 45.0);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        assert_eq!(
            decode_frame(&[0u8; 47]),
            Err(FrameError::InvalidLength {
                expected: 48,
                actual: 47
            })
        );
        assert!(decode_frame(&[0u8; 49]).is_err());
    }
}
