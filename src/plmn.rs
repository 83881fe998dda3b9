//! PLMN Identity Handling
//!
//! Visited-PLMN derivation from the leading IMSI digits and the 3-byte
//! BCD wire encoding used on the S6a interface.

use thiserror::Error;

/// MAX IMSI BCD length
pub const MAX_IMSI_BCD_LEN: usize = 15;

/// PLMN derivation error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlmnError {
    #[error("Invalid IMSI [{0}]")]
    InvalidImsi(String),
    #[error("Unknown MCC [{0}]")]
    UnknownMcc(u16),
    #[error("IMSI too short for MNC length {mnc_len} [{imsi}]")]
    TruncatedImsi { imsi: String, mnc_len: usize },
}

/// PLMN ID
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PlmnId {
    /// MCC digit 1
    pub mcc1: u8,
    /// MCC digit 2
    pub mcc2: u8,
    /// MCC digit 3
    pub mcc3: u8,
    /// MNC digit 1
    pub mnc1: u8,
    /// MNC digit 2
    pub mnc2: u8,
    /// MNC digit 3 (0xf if 2-digit MNC)
    pub mnc3: u8,
}

impl PlmnId {
    /// Create a new PLMN ID from MCC/MNC digit strings
    pub fn new(mcc: &str, mnc: &str) -> Self {
        let mcc_bytes: Vec<u8> = mcc
            .chars()
            .filter_map(|c| c.to_digit(10).map(|d| d as u8))
            .collect();
        let mnc_bytes: Vec<u8> = mnc
            .chars()
            .filter_map(|c| c.to_digit(10).map(|d| d as u8))
            .collect();

        Self {
            mcc1: mcc_bytes.first().copied().unwrap_or(0),
            mcc2: mcc_bytes.get(1).copied().unwrap_or(0),
            mcc3: mcc_bytes.get(2).copied().unwrap_or(0),
            mnc1: mnc_bytes.first().copied().unwrap_or(0),
            mnc2: mnc_bytes.get(1).copied().unwrap_or(0),
            mnc3: mnc_bytes.get(2).copied().unwrap_or(0xf),
        }
    }

    /// Convert to a BCD digit string (5 or 6 digits)
    pub fn to_bcd(&self) -> String {
        if self.mnc3 == 0xf {
            format!(
                "{}{}{}{}{}",
                self.mcc1, self.mcc2, self.mcc3, self.mnc1, self.mnc2
            )
        } else {
            format!(
                "{}{}{}{}{}{}",
                self.mcc1, self.mcc2, self.mcc3, self.mnc1, self.mnc2, self.mnc3
            )
        }
    }

    /// Encode to the 3-byte BCD wire format used by the Visited-PLMN-Id AVP
    pub fn encode(&self) -> [u8; 3] {
        let mut buf = [0u8; 3];
        buf[0] = (self.mcc2 << 4) | self.mcc1;
        buf[1] = (self.mnc3 << 4) | self.mcc3;
        buf[2] = (self.mnc2 << 4) | self.mnc1;
        buf
    }
}

/// MNC length for a Mobile Country Code.
///
/// Compiled-in table, not runtime configuration. ITU assigns MNC length
/// per country; the North-American and a handful of Caribbean MCCs use
/// 3-digit MNCs, everything else in the assigned MCC space uses 2.
/// An MCC outside the assigned space has no entry: a subscriber identity
/// carrying one cannot be serviced.
pub fn mnc_len(mcc: u16) -> Option<usize> {
    // 3-digit MNC countries (ITU-T E.212 Annex)
    const MNC3: &[u16] = &[
        302, 310, 311, 312, 313, 314, 315, 316, 334, 338, 342, 344, 346, 348, 352, 354, 356, 358,
        360, 363, 364, 365, 366, 376, 405, 708, 714, 722, 732, 738, 750,
    ];
    if MNC3.contains(&mcc) {
        return Some(3);
    }
    match mcc {
        // test network
        1 => Some(2),
        // assigned geographic MCC space
        200..=799 => Some(2),
        // shared/test codes
        900..=999 => Some(2),
        _ => None,
    }
}

/// Validate an IMSI BCD string: non-empty, all decimal digits, at most
/// 15 digits.
pub fn validate_imsi(imsi_bcd: &str) -> Result<(), PlmnError> {
    if imsi_bcd.is_empty()
        || imsi_bcd.len() > MAX_IMSI_BCD_LEN
        || !imsi_bcd.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(PlmnError::InvalidImsi(imsi_bcd.to_string()));
    }
    Ok(())
}

/// Derive the visited PLMN from the leading 5-6 digits of an IMSI.
///
/// The first 3 digits are the MCC; the MNC length (2 or 3) comes from
/// the static table above. An MCC with no table entry is unrecoverable.
pub fn visited_plmn_from_imsi(imsi_bcd: &str) -> Result<PlmnId, PlmnError> {
    validate_imsi(imsi_bcd)?;
    if imsi_bcd.len() < 5 {
        return Err(PlmnError::InvalidImsi(imsi_bcd.to_string()));
    }

    let mcc_str = &imsi_bcd[..3];
    let mcc: u16 = mcc_str.parse().map_err(|_| PlmnError::InvalidImsi(imsi_bcd.to_string()))?;
    let mnc_len = mnc_len(mcc).ok_or(PlmnError::UnknownMcc(mcc))?;

    if imsi_bcd.len() < 3 + mnc_len {
        return Err(PlmnError::TruncatedImsi {
            imsi: imsi_bcd.to_string(),
            mnc_len,
        });
    }

    Ok(PlmnId::new(mcc_str, &imsi_bcd[3..3 + mnc_len]))
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_3digit_mnc() {
        // MCC=310, MNC=410 -> mcc1=3, mcc2=1, mcc3=0, mnc1=4, mnc2=1, mnc3=0
        let plmn = PlmnId::new("310", "410");
        let encoded = plmn.encode();
        // byte[0] = (mcc2<<4)|mcc1 = (1<<4)|3 = 0x13
        assert_eq!(encoded[0], 0x13);
        // byte[1] = (mnc3<<4)|mcc3 = (0<<4)|0 = 0x00
        assert_eq!(encoded[1], 0x00);
        // byte[2] = (mnc2<<4)|mnc1 = (1<<4)|4 = 0x14
        assert_eq!(encoded[2], 0x14);
    }

    #[test]
    fn test_encode_2digit_mnc() {
        // MCC=001, MNC=01 -> mnc3 filler = 0xf
        let plmn = PlmnId::new("001", "01");
        let encoded = plmn.encode();
        assert_eq!(encoded[0], 0x00);
        assert_eq!(encoded[1], 0xf1);
        assert_eq!(encoded[2], 0x10);
    }

    #[test]
    fn test_to_bcd() {
        assert_eq!(PlmnId::new("208", "01").to_bcd(), "20801");
        assert_eq!(PlmnId::new("310", "260").to_bcd(), "310260");
    }

    #[test]
    fn test_mnc_len_table() {
        assert_eq!(mnc_len(208), Some(2)); // France
        assert_eq!(mnc_len(310), Some(3)); // US
        assert_eq!(mnc_len(302), Some(3)); // Canada
        assert_eq!(mnc_len(1), Some(2)); // test PLMN
        assert_eq!(mnc_len(901), Some(2));
        assert_eq!(mnc_len(100), None);
        assert_eq!(mnc_len(0), None);
    }

    #[test]
    fn test_visited_plmn_2digit() {
        let plmn = visited_plmn_from_imsi("208011234567890").unwrap();
        assert_eq!(plmn, PlmnId::new("208", "01"));
        assert_eq!(plmn.mnc3, 0xf);
    }

    #[test]
    fn test_visited_plmn_3digit() {
        let plmn = visited_plmn_from_imsi("310260123456789").unwrap();
        assert_eq!(plmn, PlmnId::new("310", "260"));
        assert_eq!(plmn.mnc3, 0);
    }

    #[test]
    fn test_visited_plmn_truncated_before_mnc() {
        // 5 digits clear the minimum length, but MCC 310 needs a
        // 3-digit MNC and only 2 digits remain
        assert_eq!(
            visited_plmn_from_imsi("31026"),
            Err(PlmnError::TruncatedImsi {
                imsi: "31026".to_string(),
                mnc_len: 3,
            })
        );
        // same prefix with the full MNC resolves
        assert!(visited_plmn_from_imsi("310260").is_ok());
    }

    #[test]
    fn test_visited_plmn_unknown_mcc() {
        assert_eq!(
            visited_plmn_from_imsi("099990123456789"),
            Err(PlmnError::UnknownMcc(99))
        );
    }

    #[test]
    fn test_visited_plmn_bad_imsi() {
        assert!(matches!(
            visited_plmn_from_imsi(""),
            Err(PlmnError::InvalidImsi(_))
        ));
        assert!(matches!(
            visited_plmn_from_imsi("20801123456789012"),
            Err(PlmnError::InvalidImsi(_))
        ));
        assert!(matches!(
            visited_plmn_from_imsi("20801x234"),
            Err(PlmnError::InvalidImsi(_))
        ));
        // valid MCC, 3-digit MNC country, but only 4 digits past MCC lead
        assert!(matches!(
            visited_plmn_from_imsi("3102"),
            Err(PlmnError::InvalidImsi(_))
        ));
    }

    #[test]
    fn test_validate_imsi() {
        assert!(validate_imsi("208011234567890").is_ok());
        assert!(validate_imsi("01").is_ok());
        assert!(validate_imsi("").is_err());
        assert!(validate_imsi("0123456789012345").is_err());
    }
}
