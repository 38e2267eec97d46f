//! Robot state messages (source type 16)
//!
//! A robot state packet is a run of sub-packages:
//!
//! ```text
//! ┌────────────────┬─────────────┬───────────────────┐
//! │ Size (i32, BE) │ Subtype u8  │ size - 5 bytes    │
//! └────────────────┴─────────────┴───────────────────┘
//! ```
//!
//! Only cartesian info is decoded. The first decoded sub-package ends the
//! scan; unknown sub-packages are skipped by their declared size.

use crate::error::DecodeError;
use crate::wire::ByteReader;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const SUBTYPE_ROBOT_MODE_DATA: u8 = 0;
pub const SUBTYPE_JOINT_DATA: u8 = 1;
pub const SUBTYPE_TOOL_DATA: u8 = 2;
pub const SUBTYPE_MASTERBOARD_DATA: u8 = 3;
pub const SUBTYPE_CARTESIAN_INFO: u8 = 4;
pub const SUBTYPE_KINEMATICS_INFO: u8 = 5;
pub const SUBTYPE_CONFIGURATION_DATA: u8 = 6;
pub const SUBTYPE_FORCE_MODE_DATA: u8 = 7;
pub const SUBTYPE_ADDITIONAL_INFO: u8 = 8;
pub const SUBTYPE_CALIBRATION_DATA: u8 = 9;
pub const SUBTYPE_SAFETY_DATA: u8 = 10;
pub const SUBTYPE_TOOL_COMM_INFO: u8 = 11;
pub const SUBTYPE_TOOL_MODE_INFO: u8 = 12;
pub const SUBTYPE_SINGULARITY_INFO: u8 = 13;

const SUB_PACKAGE_HEADER_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "subtype")]
pub enum RobotStateMessage {
    CartesianInfo(CartesianInfo),
}

/// Tool center point pose and configured TCP offset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartesianInfo {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
    pub tcp_offset_x: f64,
    pub tcp_offset_y: f64,
    pub tcp_offset_z: f64,
    pub tcp_offset_rx: f64,
    pub tcp_offset_ry: f64,
    pub tcp_offset_rz: f64,
    pub received_at: DateTime<Utc>,
}

impl CartesianInfo {
    fn unpack(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            x: reader.f64()?,
            y: reader.f64()?,
            z: reader.f64()?,
            rx: reader.f64()?,
            ry: reader.f64()?,
            rz: reader.f64()?,
            tcp_offset_x: reader.f64()?,
            tcp_offset_y: reader.f64()?,
            tcp_offset_z: reader.f64()?,
            tcp_offset_rx: reader.f64()?,
            tcp_offset_ry: reader.f64()?,
            tcp_offset_rz: reader.f64()?,
            received_at: Utc::now(),
        })
    }
}

impl RobotStateMessage {
    pub fn unpack(payload: &[u8]) -> Result<Option<Self>, DecodeError> {
        let mut reader = ByteReader::new(payload);

        while reader.remaining() > 0 {
            let offset = reader.offset();
            let size = reader.i32()?;
            if size < SUB_PACKAGE_HEADER_LEN as i32 {
                return Err(DecodeError::InvalidPackageSize { offset, size });
            }
            let subtype = reader.u8()?;
            let body = reader.take(size as usize - SUB_PACKAGE_HEADER_LEN)?;

            if subtype == SUBTYPE_CARTESIAN_INFO {
                let info = CartesianInfo::unpack(&mut ByteReader::new(body))?;
                return Ok(Some(RobotStateMessage::CartesianInfo(info)));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
pub(crate) fn sub_package(subtype: u8, body: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&((body.len() + SUB_PACKAGE_HEADER_LEN) as i32).to_be_bytes());
    bytes.push(subtype);
    bytes.extend_from_slice(body);
    bytes
}

#[cfg(test)]
pub(crate) fn cartesian_body(values: [f64; 12]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose() -> [f64; 12] {
        [0.1, 0.2, 0.3, 1.0, 2.0, 3.0, 0.0, 0.0, 0.15, 0.0, 0.0, 0.0]
    }

    #[test]
    fn test_skips_unknown_sub_packages() {
        let mut payload = sub_package(SUBTYPE_ROBOT_MODE_DATA, &[0; 40]);
        payload.extend(sub_package(SUBTYPE_JOINT_DATA, &[1; 7]));
        payload.extend(sub_package(SUBTYPE_CARTESIAN_INFO, &cartesian_body(pose())));

        let message = RobotStateMessage::unpack(&payload).unwrap().unwrap();
        let RobotStateMessage::CartesianInfo(info) = message;

        assert_eq!(info.x, 0.1);
        assert_eq!(info.rz, 3.0);
        assert_eq!(info.tcp_offset_z, 0.15);
    }

    #[test]
    fn test_stops_at_first_cartesian_info() {
        let mut second = pose();
        second[0] = 9.0;

        let mut payload = sub_package(SUBTYPE_CARTESIAN_INFO, &cartesian_body(pose()));
        payload.extend(sub_package(SUBTYPE_CARTESIAN_INFO, &cartesian_body(second)));
        // trailing garbage is never reached
        payload.extend([0xff; 3]);

        let RobotStateMessage::CartesianInfo(info) = RobotStateMessage::unpack(&payload).unwrap().unwrap();
        assert_eq!(info.x, 0.1);
    }

    #[test]
    fn test_no_recognized_sub_package() {
        let payload = sub_package(SUBTYPE_MASTERBOARD_DATA, &[0; 12]);
        assert_eq!(RobotStateMessage::unpack(&payload).unwrap(), None);
        assert_eq!(RobotStateMessage::unpack(&[]).unwrap(), None);
    }

    #[test]
    fn test_invalid_sub_package_size() {
        let payload = [0, 0, 0, 2, SUBTYPE_JOINT_DATA];
        assert_eq!(
            RobotStateMessage::unpack(&payload),
            Err(DecodeError::InvalidPackageSize { offset: 0, size: 2 })
        );
    }

    #[test]
    fn test_sub_package_overrunning_payload() {
        let mut payload = sub_package(SUBTYPE_CARTESIAN_INFO, &cartesian_body(pose()));
        payload.truncate(50);
        assert!(matches!(
            RobotStateMessage::unpack(&payload),
            Err(DecodeError::Truncated { .. })
        ));
    }
}
