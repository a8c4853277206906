//! BIP-39 mnemonic generation, validation and seed derivation.

use bip39::{Language, Mnemonic};
use rand::RngCore;

use crate::error::WalletError;
use crate::keys::Seed;

/// Entropy drawn for a new wallet, in bytes (128 bits).
pub const ENTROPY_BYTES: usize = 16;

/// Word count accepted on generation and import.
pub const MNEMONIC_WORD_COUNT: usize = 12;

/// Generate a fresh 12-word mnemonic from the OS cryptographic RNG.
pub fn generate() -> Mnemonic {
    let mut entropy = [0u8; ENTROPY_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut entropy);
    let m = from_entropy(&entropy);
    zeroize::Zeroize::zeroize(&mut entropy);
    m
}

/// Encode 16 bytes of entropy as a 12-word phrase.
pub fn from_entropy(entropy: &[u8; ENTROPY_BYTES]) -> Mnemonic {
    Mnemonic::from_entropy_in(Language::English, entropy)
        .expect("16 bytes is a valid BIP-39 entropy length")
}

/// Parse and validate a candidate phrase.
///
/// Words must be lowercase English wordlist entries separated by
/// whitespace, exactly [`MNEMONIC_WORD_COUNT`] of them, with a valid
/// checksum. Nothing is corrected or normalized on the caller's behalf.
pub fn validate(phrase: &str) -> Result<Mnemonic, WalletError> {
    let word_count = phrase.split_whitespace().count();
    if word_count != MNEMONIC_WORD_COUNT {
        return Err(WalletError::InvalidMnemonic(format!(
            "expected {MNEMONIC_WORD_COUNT} words, got {word_count}"
        )));
    }
    Mnemonic::parse_in(Language::English, phrase)
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))
}

/// Derive the 64-byte BIP-39 seed. Pure and deterministic.
pub fn to_seed(mnemonic: &Mnemonic, passphrase: &str) -> Seed {
    Seed::from_bytes(mnemonic.to_seed(passphrase))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABANDON_ABOUT: &str = "abandon abandon abandon abandon abandon abandon \
                                 abandon abandon abandon abandon abandon about";

    #[test]
    fn generate_is_12_words() {
        let m = generate();
        assert_eq!(m.word_count(), 12);
        assert!(validate(&m.to_string()).is_ok());
    }

    #[test]
    fn generate_unique() {
        assert_ne!(generate().to_string(), generate().to_string());
    }

    #[test]
    fn zero_entropy_vector() {
        let m = from_entropy(&[0u8; 16]);
        let normalized = ABANDON_ABOUT.split_whitespace().collect::<Vec<_>>().join(" ");
        assert_eq!(m.to_string(), normalized);
    }

    #[test]
    fn trezor_seed_vector() {
        let m = validate(ABANDON_ABOUT).unwrap();
        let seed = to_seed(&m, "TREZOR");
        assert_eq!(
            hex::encode(seed.as_bytes()),
            "c55257c360c07c72029aebc1b53c05ed0362ada38ead3e3e9efa3708e5349553\
             1f09a6987599d18264c1e1c92f2cf141630c7a3c4ab7c81b2f001698e7463b04"
        );
    }

    #[test]
    fn seed_deterministic() {
        let m = validate(ABANDON_ABOUT).unwrap();
        assert_eq!(to_seed(&m, "").as_bytes(), to_seed(&m, "").as_bytes());
    }

    #[test]
    fn passphrase_changes_seed() {
        let m = validate(ABANDON_ABOUT).unwrap();
        assert_ne!(to_seed(&m, "").as_bytes(), to_seed(&m, "x").as_bytes());
    }

    #[test]
    fn bad_checksum_rejected() {
        let phrase = ["abandon"; 12].join(" ");
        let err = validate(&phrase).unwrap_err();
        assert!(matches!(err, WalletError::InvalidMnemonic(_)));
    }

    #[test]
    fn mutated_last_word_rejected() {
        let phrase = ABANDON_ABOUT.replace("about", "zoo");
        assert!(validate(&phrase).is_err());
    }

    #[test]
    fn unknown_word_rejected() {
        let phrase = ABANDON_ABOUT.replace("about", "bitcoinz");
        let err = validate(&phrase).unwrap_err();
        assert!(err.to_string().contains("invalid mnemonic"));
    }

    #[test]
    fn wrong_word_count_rejected() {
        assert!(validate("abandon abandon").is_err());
        let twenty_four = format!("{} art", ["abandon"; 23].join(" "));
        let err = validate(&twenty_four).unwrap_err();
        assert!(err.to_string().contains("expected 12 words"));
    }

    #[test]
    fn uppercase_not_normalized() {
        assert!(validate(&ABANDON_ABOUT.to_uppercase()).is_err());
    }
}
