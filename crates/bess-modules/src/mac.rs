//! MAC address parsing and wire extraction shared by the L2 forwarder.

use bess_core::{Error, ErrorKind};

/// Parses a colon-separated MAC string (`"01:23:45:67:89:ab"`) into the
/// 48-bit integer representation [`bess_l2::Entry`] expects.
pub fn parse(mac: &str) -> Result<u64, Error> {
    let mut octets = mac.split(':');
    let mut addr: u64 = 0;
    let mut count = 0;
    for octet in &mut octets {
        if count == 6 {
            return Err(Error::new(ErrorKind::InvalidArg, "mac address has more than 6 octets"));
        }
        let byte = u8::from_str_radix(octet, 16)
            .map_err(|_| Error::new(ErrorKind::InvalidArg, format!("invalid mac octet `{octet}`")))?;
        addr = (addr << 8) | u64::from(byte);
        count += 1;
    }
    if count != 6 {
        return Err(Error::new(ErrorKind::InvalidArg, "mac address must have exactly 6 octets"));
    }
    Ok(addr)
}

/// Formats a 48-bit MAC integer back into colon-separated hex.
#[must_use]
pub fn format(addr: u64) -> String {
    let bytes = addr.to_be_bytes();
    let o = &bytes[2..8];
    format!("{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", o[0], o[1], o[2], o[3], o[4], o[5])
}

/// Reads the first 6 bytes of `data` (the L2 destination address) as a
/// 48-bit integer, or `None` if `data` is too short.
#[must_use]
pub fn read_dst(data: &[u8]) -> Option<u64> {
    if data.len() < 6 {
        return None;
    }
    let mut buf = [0u8; 8];
    buf[2..8].copy_from_slice(&data[..6]);
    Some(u64::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_formats_round_trip() {
        let addr = parse("01:23:45:67:89:ab").unwrap();
        assert_eq!(addr, 0x0123_4567_89ab);
        assert_eq!(format(addr), "01:23:45:67:89:ab");
    }

    #[test]
    fn rejects_malformed_mac() {
        assert!(parse("01:23:45:67:89").is_err());
        assert!(parse("01:23:45:67:89:ab:cd").is_err());
        assert!(parse("zz:23:45:67:89:ab").is_err());
    }

    #[test]
    fn reads_destination_from_ethernet_header() {
        let frame = [0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
        assert_eq!(read_dst(&frame), Some(0x0123_4567_89ab));
        assert_eq!(read_dst(&frame[..4]), None);
    }
}
