//! Virtual Decryptor: executes fragment decryption as a randomized program
//! over abstract steps, so an API-level tracer cannot tell the real
//! operations apart from decoys by call shape alone.

use crate::canary;
use crate::crypto::aes_gcm::{self, AesKey};
use crate::crypto::constant_time::ConstantTimeMemory;
use crate::crypto::hmac;
use crate::crypto::random;
use crate::display;
use crate::entropy::RuntimeEntropyBundle;
use crate::ephemeral_key;
use crate::error::{VaultError, VaultResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// One step of a Virtual Decryptor program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Recompute and compare the fragment's HMAC.
    HmacVerify,
    /// AAD substitution check followed by AES-GCM decryption.
    RealDecrypt,
    /// Constant-time canary verification, then strip.
    CanaryCheck,
    /// Derive the ephemeral key from runtime entropy.
    EphemeralDerive,
    /// Apply the display mutation keystream.
    DisplayMutate,
    /// Real AES-GCM call on a fresh random key/plaintext; output discarded.
    DecoyInject,
    /// CPU-bound no-op to normalize timing.
    DummySpin,
}

const REAL_SEQUENCE: [Step; 5] = [
    Step::HmacVerify,
    Step::RealDecrypt,
    Step::CanaryCheck,
    Step::EphemeralDerive,
    Step::DisplayMutate,
];

/// Produces the ordered step list for one decryption. Construction and
/// execution are kept separate so a deterministic builder can substitute
/// for the randomized one in tests.
pub trait ProgramBuilder {
    /// Build a program respecting `HMAC_VERIFY ≺ REAL_DECRYPT ≺
    /// CANARY_CHECK ≺ EPHEMERAL_DERIVE ≺ DISPLAY_MUTATE`.
    fn build(&self) -> Vec<Step>;
}

/// Default builder: 2-4 decoy injections and 1-3 dummy spins, with one
/// decoy bracketing each end of the real sequence and the remainder
/// scattered at uniformly random gaps among the real steps.
pub struct RandomizedProgramBuilder;

impl ProgramBuilder for RandomizedProgramBuilder {
    fn build(&self) -> Vec<Step> {
        let decoy_count = 2 + random::random_range(3) as usize; // 2..=4
        let dummy_count = 1 + random::random_range(3) as usize; // 1..=3
        let scattered_decoys = decoy_count - 2;

        let mut extras = Vec::with_capacity(scattered_decoys + dummy_count);
        extras.extend(std::iter::repeat(Step::DecoyInject).take(scattered_decoys));
        extras.extend(std::iter::repeat(Step::DummySpin).take(dummy_count));

        let mut gaps: Vec<Vec<Step>> = vec![Vec::new(); REAL_SEQUENCE.len() + 1];
        for extra in extras {
            let gap = random::random_range((gaps.len()) as u64) as usize;
            gaps[gap].push(extra);
        }

        let mut program = Vec::with_capacity(REAL_SEQUENCE.len() + decoy_count + dummy_count + 2);
        program.push(Step::DecoyInject);
        for (i, gap) in gaps.iter().enumerate() {
            program.extend_from_slice(gap);
            if i < REAL_SEQUENCE.len() {
                program.push(REAL_SEQUENCE[i]);
            }
        }
        program.push(Step::DecoyInject);
        program
    }
}

/// Builder producing an explicit, caller-supplied step list. Used in tests
/// that need to pin the decoy/dummy placement.
pub struct FixedProgramBuilder {
    /// The exact program to return from `build`.
    pub program: Vec<Step>,
}

impl ProgramBuilder for FixedProgramBuilder {
    fn build(&self) -> Vec<Step> {
        self.program.clone()
    }
}

/// Inputs the executor needs to perform the real steps of a program.
pub struct ExecutionContext<'a> {
    /// Chapter root key, used for canary derivation and ephemeral key input.
    pub chapter_root: &'a [u8],
    /// AES key wrapping this fragment's ciphertext.
    pub aes_key: &'a AesKey,
    /// HMAC key covering this fragment's ciphertext.
    pub hmac_key: &'a [u8],
    /// Image identifier (part of the fragment's AAD).
    pub image_id: &'a str,
    /// Fragment index.
    pub index: u32,
    /// Fragment ciphertext: `IV ∥ CT ∥ tag`.
    pub encrypted_data: &'a [u8],
    /// Stored hex HMAC to verify against.
    pub stored_hmac_hex: &'a str,
    /// Stored Base64 AAD to verify against.
    pub stored_aad_b64: &'a str,
    /// Runtime entropy snapshot for this render.
    pub entropy: &'a RuntimeEntropyBundle,
}

fn fragment_aad(image_id: &str, index: u32) -> Vec<u8> {
    format!("{}:{}", image_id, index).into_bytes()
}

fn decoy_inject() -> VaultResult<()> {
    let key = AesKey::generate();
    let len = 64 + random::random_range(192) as usize;
    let plaintext = random::random_bytes(len.max(1))?;
    let _ = aes_gcm::encrypt_combined(&key, &plaintext, &[]);
    Ok(())
}

fn dummy_spin() {
    let mut acc: u64 = 0;
    for i in 0..5000u64 {
        acc = acc.wrapping_add(i.wrapping_mul(2654435761));
    }
    std::hint::black_box(acc);
}

/// Execute `program` against `ctx`, performing the fail-fast checks in
/// whatever order the real steps appear (always
/// `HMAC_VERIFY ≺ REAL_DECRYPT ≺ CANARY_CHECK ≺ EPHEMERAL_DERIVE ≺
/// DISPLAY_MUTATE` for a program built by a conforming `ProgramBuilder`).
/// Returns the display-mutated plaintext once `DISPLAY_MUTATE` runs.
pub fn execute(program: &[Step], ctx: &ExecutionContext) -> VaultResult<Vec<u8>> {
    let mut plaintext_with_canary: Option<Vec<u8>> = None;
    let mut plaintext: Option<Vec<u8>> = None;
    let mut ephemeral_key: Option<crate::memory::SecretBuffer> = None;
    let mut result: Option<Vec<u8>> = None;

    for step in program {
        match step {
            Step::HmacVerify => {
                let expected = hmac::sign(ctx.hmac_key, ctx.encrypted_data);
                let stored = hex::decode(ctx.stored_hmac_hex)
                    .map_err(|_| VaultError::InvalidInput("bad hmac hex".to_string()))?;
                if !bool::from(ConstantTimeMemory::ct_memcmp(&expected, &stored)) {
                    return Err(VaultError::IntegrityFail);
                }
            }
            Step::RealDecrypt => {
                let expected_aad = fragment_aad(ctx.image_id, ctx.index);
                let expected_aad_b64 = BASE64.encode(&expected_aad);
                if !bool::from(ConstantTimeMemory::ct_memcmp(
                    expected_aad_b64.as_bytes(),
                    ctx.stored_aad_b64.as_bytes(),
                )) {
                    return Err(VaultError::SubstitutionFail);
                }
                let decrypted = aes_gcm::decrypt_combined(ctx.aes_key, ctx.encrypted_data, &expected_aad)
                    .map_err(|_| VaultError::AuthFail)?;
                plaintext_with_canary = Some(decrypted);
            }
            Step::CanaryCheck => {
                let blob = plaintext_with_canary.as_ref().ok_or_else(|| {
                    VaultError::ProgramPreconditionViolated("canary check before real decrypt".to_string())
                })?;
                let expected_canary = canary::derive(ctx.chapter_root, ctx.index)?;
                canary::verify(blob, &expected_canary)?;
                plaintext = Some(canary::strip(blob)?);
            }
            Step::EphemeralDerive => {
                ephemeral_key = Some(ephemeral_key::derive_ephemeral_key(ctx.chapter_root, ctx.entropy)?);
            }
            Step::DisplayMutate => {
                let pt = plaintext.as_ref().ok_or_else(|| {
                    VaultError::ProgramPreconditionViolated("display mutate before canary check".to_string())
                })?;
                let key = ephemeral_key.as_ref().ok_or_else(|| {
                    VaultError::ProgramPreconditionViolated(
                        "display mutate before ephemeral derive".to_string(),
                    )
                })?;
                result = Some(display::apply(pt, key.as_slice())?);
            }
            Step::DecoyInject => decoy_inject()?,
            Step::DummySpin => dummy_spin(),
        }
    }

    if let Some(mut blob) = plaintext_with_canary {
        crate::memory::wipe_vec(&mut blob);
    }
    if let Some(mut pt) = plaintext {
        crate::memory::wipe_vec(&mut pt);
    }

    result.ok_or(VaultError::ProgramIncomplete)
}
