use custody_wallet::crypto::{open, seal, KeyDerivation, KeyPurpose};
use custody_wallet::WalletError;
use proptest::prelude::*;

fn kdf() -> KeyDerivation {
    KeyDerivation::pbkdf2(1_000)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn decrypt_inverts_encrypt(
        plaintext in proptest::collection::vec(any::<u8>(), 0..128),
        password in "[ -~]{1,24}",
    ) {
        let record = seal(&plaintext, &password, KeyPurpose::Seed, kdf()).unwrap();
        let opened = open(&record, &password, KeyPurpose::Seed).unwrap();
        prop_assert_eq!(opened.as_slice(), plaintext.as_slice());
    }

    #[test]
    fn wrong_password_never_decrypts(
        plaintext in proptest::collection::vec(any::<u8>(), 1..64),
        pw1 in "[a-z0-9]{1,16}",
        pw2 in "[a-z0-9]{1,16}",
    ) {
        prop_assume!(pw1 != pw2);
        let record = seal(&plaintext, &pw1, KeyPurpose::Mnemonic, kdf()).unwrap();
        let is_decryption_error = matches!(
            open(&record, &pw2, KeyPurpose::Mnemonic),
            Err(WalletError::DecryptionError(_))
        );
        prop_assert!(is_decryption_error);
    }
}

#[test]
fn test_each_record_has_its_own_salt_and_iv() {
    let a = seal(b"same", "pw", KeyPurpose::Seed, kdf()).unwrap();
    let b = seal(b"same", "pw", KeyPurpose::Seed, kdf()).unwrap();
    assert_ne!(a.salt, b.salt);
    assert_ne!(a.iv, b.iv);
    assert_ne!(a.ciphertext, b.ciphertext);
}

#[test]
fn test_record_cannot_be_opened_under_another_purpose() {
    let record = seal(b"seed bytes", "pw", KeyPurpose::Seed, kdf()).unwrap();
    let mut relabelled = record.clone();
    relabelled.purpose = KeyPurpose::Mnemonic;
    assert!(matches!(
        open(&relabelled, "pw", KeyPurpose::Mnemonic),
        Err(WalletError::DecryptionError(_))
    ));
    assert!(matches!(
        open(&record, "pw", KeyPurpose::Mnemonic),
        Err(WalletError::DecryptionError(_))
    ));
}

#[test]
fn test_tampered_tag_fails() {
    let mut record = seal(b"payload", "pw", KeyPurpose::PrivateKey, kdf()).unwrap();
    record.auth_tag[0] ^= 0x01;
    assert!(matches!(
        open(&record, "pw", KeyPurpose::PrivateKey),
        Err(WalletError::DecryptionError(_))
    ));
}
