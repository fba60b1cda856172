//! Key material for the CLI: hex keys and BIS key dumps.

use anyhow::{bail, Context, Result};

/// Number of BIS key slots in a dump.
pub const BIS_SLOTS: usize = 4;

/// Crypt and tweak key of one session.
pub type KeyPair = ([u8; 16], [u8; 16]);

/// Decodes exactly `N` bytes of hex.
pub fn decode_hex<const N: usize>(text: &str, what: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(text.trim()).with_context(|| format!("decode {what} hex"))?;
    if bytes.len() != N {
        bail!("{what} must be {N} bytes ({} hex characters)", N * 2);
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Splits a 32-byte XTS key into crypt and tweak halves.
pub fn split_pair(text: &str) -> Result<KeyPair> {
    let joined: [u8; 32] = decode_hex(text, "XTS key")?;
    let mut crypt = [0u8; 16];
    let mut tweak = [0u8; 16];
    crypt.copy_from_slice(&joined[..16]);
    tweak.copy_from_slice(&joined[16..]);
    Ok((crypt, tweak))
}

/// Slot for a NAND partition name, case-insensitively.
pub fn partition_slot(name: &str) -> Option<usize> {
    match name.to_ascii_lowercase().as_str() {
        "prodinfo" | "prodinfof" => Some(0),
        "safe" => Some(1),
        "system" => Some(2),
        "user" => Some(3),
        _ => None,
    }
}

/// Parses `--bis-index`: a slot number or a partition name.
pub fn parse_bis_slot(text: &str) -> std::result::Result<usize, String> {
    if let Some(slot) = partition_slot(text) {
        return Ok(slot);
    }
    match text.parse::<usize>() {
        Ok(slot) if slot < BIS_SLOTS => Ok(slot),
        _ => Err(format!(
            "expected 0-{} or one of prodinfo, prodinfof, safe, system, user",
            BIS_SLOTS - 1
        )),
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Slot {
    crypt: Option<[u8; 16]>,
    tweak: Option<[u8; 16]>,
}

/// The four BIS key pairs from a key dump.
///
/// Two layouts are understood and may be mixed:
///
/// ```text
/// BIS KEY 0 (crypt): 00112233445566778899aabbccddeeff
/// BIS KEY 0 (tweak): ffeeddccbbaa99887766554433221100
/// bis_key_01 = <crypt hex><tweak hex>
/// ```
///
/// Other lines, including `bis_key_source_*`, are ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BisKeys {
    slots: [Slot; BIS_SLOTS],
}

impl BisKeys {
    /// Parses a key dump.
    pub fn parse(text: &str) -> Result<Self> {
        let mut keys = Self::default();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            let parsed = if let Some(rest) = line.strip_prefix("BIS KEY") {
                keys.parse_legacy(rest)
            } else if line.starts_with("bis_key") {
                keys.parse_named(line)
            } else {
                continue;
            };
            parsed.with_context(|| format!("key dump line {}", number + 1))?;
        }
        Ok(keys)
    }

    fn parse_legacy(&mut self, rest: &str) -> Result<()> {
        let mut fields = rest.split_whitespace();
        let (Some(index), Some(kind), Some(key)) = (fields.next(), fields.next(), fields.next())
        else {
            bail!("expected `BIS KEY <n> (<crypt|tweak>): <hex>`");
        };
        let slot = self.slot_mut(index)?;
        let key = decode_hex(key, "BIS key")?;
        match kind.trim_start_matches('(').trim_end_matches(':').trim_end_matches(')') {
            "crypt" => slot.crypt = Some(key),
            "tweak" => slot.tweak = Some(key),
            other => bail!("unknown BIS key type {other:?}"),
        }
        Ok(())
    }

    fn parse_named(&mut self, line: &str) -> Result<()> {
        let Some((name, value)) = line.split_once('=') else {
            return Ok(());
        };
        let Some(index) = name.trim().strip_prefix("bis_key_") else {
            return Ok(());
        };
        // bis_key_source_XX and friends.
        if !index.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(());
        }
        let slot = self.slot_mut(index)?;
        let (crypt, tweak) = split_pair(value)?;
        slot.crypt = Some(crypt);
        slot.tweak = Some(tweak);
        Ok(())
    }

    fn slot_mut(&mut self, index: &str) -> Result<&mut Slot> {
        let index: usize = index.parse().with_context(|| format!("BIS key index {index:?}"))?;
        self.slots
            .get_mut(index)
            .with_context(|| format!("BIS key index {index} out of range"))
    }

    /// The crypt and tweak key of `slot`, if both were present.
    pub fn pair(&self, slot: usize) -> Result<KeyPair> {
        match self.slots.get(slot) {
            Some(Slot {
                crypt: Some(crypt),
                tweak: Some(tweak),
            }) => Ok((*crypt, *tweak)),
            Some(_) => bail!("key dump does not contain both halves of BIS key {slot}"),
            None => bail!("BIS key index {slot} out of range"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CRYPT: &str = "00112233445566778899aabbccddeeff";
    const TWEAK: &str = "ffeeddccbbaa99887766554433221100";

    #[test]
    fn parses_legacy_dump() {
        let dump = format!(
            "HWI:\nBIS KEY 2 (crypt): {CRYPT}\nBIS KEY 2 (tweak): {TWEAK}\nTSEC KEY: 00\n"
        );
        let keys = BisKeys::parse(&dump).unwrap();
        let (crypt, tweak) = keys.pair(2).unwrap();
        assert_eq!(hex::encode(crypt), CRYPT);
        assert_eq!(hex::encode(tweak), TWEAK);
        assert!(keys.pair(0).is_err());
    }

    #[test]
    fn parses_named_dump_and_skips_sources() {
        let dump = format!(
            "bis_key_source_00 = {CRYPT}{TWEAK}\nbis_key_03 = {CRYPT}{TWEAK}\nheader_key = 00\n"
        );
        let keys = BisKeys::parse(&dump).unwrap();
        let (crypt, tweak) = keys.pair(3).unwrap();
        assert_eq!(hex::encode(crypt), CRYPT);
        assert_eq!(hex::encode(tweak), TWEAK);
        assert!(keys.pair(0).is_err());
    }

    #[test]
    fn rejects_bad_lines() {
        let unknown = format!("BIS KEY 1 (other): {CRYPT}");
        assert!(BisKeys::parse(&unknown).is_err());
        let out_of_range = format!("bis_key_07 = {CRYPT}{TWEAK}");
        assert!(BisKeys::parse(&out_of_range).is_err());
        assert!(BisKeys::parse("bis_key_00 = 0011").is_err());
    }

    #[test]
    fn half_a_pair_is_not_enough() {
        let keys = BisKeys::parse(&format!("BIS KEY 1 (crypt): {CRYPT}")).unwrap();
        let err = keys.pair(1).unwrap_err();
        assert!(err.to_string().contains("both halves"));
    }

    #[test]
    fn bis_slot_accepts_numbers_and_partitions() {
        assert_eq!(parse_bis_slot("3"), Ok(3));
        assert_eq!(parse_bis_slot("PRODINFOF"), Ok(0));
        assert_eq!(parse_bis_slot("safe"), Ok(1));
        assert_eq!(parse_bis_slot("user"), Ok(3));
        assert!(parse_bis_slot("4").is_err());
        assert!(parse_bis_slot("boot0").is_err());
    }

    #[test]
    fn split_pair_checks_length() {
        let (crypt, tweak) = split_pair(&format!("{CRYPT}{TWEAK}")).unwrap();
        assert_eq!(crypt[0], 0x00);
        assert_eq!(tweak[0], 0xff);
        assert!(split_pair(CRYPT).is_err());
        assert!(decode_hex::<16>("zz", "crypt key").is_err());
    }
}
