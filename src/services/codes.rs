use rand::{rngs::OsRng, Rng};

pub const OTP_DIGITS: usize = 5;

/// Zero-padded numeric one-time code drawn from the OS CSPRNG.
pub fn generate_otp() -> String {
    let n: u32 = OsRng.gen_range(0..10u32.pow(OTP_DIGITS as u32));
    format!("{n:0width$}", width = OTP_DIGITS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn otp_is_five_digits() {
        for _ in 0..200 {
            let code = generate_otp();
            assert_eq!(code.len(), OTP_DIGITS);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn otp_is_not_constant() {
        let codes: HashSet<String> = (0..50).map(|_| generate_otp()).collect();
        assert!(codes.len() > 1);
    }
}
