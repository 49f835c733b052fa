//! # DShot Checksum
//!
//! 4-bit checksum over the 12-bit value + telemetry field: the XOR of its
//! three nibbles.

/// Calculate the frame checksum for a 12-bit value/telemetry field
///
/// # Arguments
///
/// * `field` - `(value << 1) | telemetry`; bits above 11 are ignored
///
/// # Returns
///
/// * `u16` - Checksum in the low 4 bits
///
/// # Examples
///
/// ```
/// use esc_bitbang::dshot::checksum::frame_checksum;
///
/// assert_eq!(frame_checksum(0x0C8), 0x4);
/// ```
pub const fn frame_checksum(field: u16) -> u16 {
    (field ^ (field >> 4) ^ (field >> 8)) & 0x0F
}
