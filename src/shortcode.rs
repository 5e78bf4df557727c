use rand::RngCore;

/// Length of every generated shortcode.
pub const GENERATED_CODE_LEN: usize = 7;

/// URL-safe alphabet; exactly 64 symbols so a 6-bit mask picks uniformly.
const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> String {
        let mut bytes = [0; GENERATED_CODE_LEN];
        rand::rng().fill_bytes(&mut bytes);
        bytes
            .iter()
            .map(|byte| char::from(ALPHABET[usize::from(byte & 0x3f)]))
            .collect()
    }
}
