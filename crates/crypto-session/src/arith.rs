//! Modular arithmetic over u64 with 128-bit intermediates

/// Miller-Rabin witnesses; deterministic for every u64
const WITNESSES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

pub(crate) fn mul_mod(a: u64, b: u64, modulus: u64) -> u64 {
    ((a as u128 * b as u128) % modulus as u128) as u64
}

/// `base^exp mod modulus`; zero for a modulus of 0 or 1
pub fn mod_pow(base: u64, exp: u64, modulus: u64) -> u64 {
    if modulus <= 1 {
        return 0;
    }

    let mut result = 1u64;
    let mut base = base % modulus;
    let mut exp = exp;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mul_mod(result, base, modulus);
        }
        base = mul_mod(base, base, modulus);
        exp >>= 1;
    }
    result
}

pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Inverse of `a` modulo `modulus`, if `gcd(a, modulus) == 1`
pub fn mod_inverse(a: u64, modulus: u64) -> Option<u64> {
    if modulus == 0 {
        return None;
    }
    if modulus == 1 {
        return Some(0);
    }

    let m = modulus as i128;
    let (mut old_r, mut r) = (a as i128 % m, m);
    let (mut old_s, mut s) = (1i128, 0i128);
    while r != 0 {
        let q = old_r / r;
        (old_r, r) = (r, old_r - q * r);
        (old_s, s) = (s, old_s - q * s);
    }

    if old_r != 1 {
        return None;
    }
    Some(old_s.rem_euclid(m) as u64)
}

pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    for p in WITNESSES {
        if n % p == 0 {
            return n == p;
        }
    }

    let mut d = n - 1;
    let mut s = 0;
    while d % 2 == 0 {
        d /= 2;
        s += 1;
    }

    'witness: for a in WITNESSES {
        let mut x = mod_pow(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..s {
            x = mul_mod(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mod_pow() {
        assert_eq!(mod_pow(5, 6, 23), 8);
        assert_eq!(mod_pow(2, 10, 1000), 24);
        assert_eq!(mod_pow(7, 0, 13), 1);
        assert_eq!(mod_pow(7, 5, 1), 0);
        assert_eq!(mod_pow(u64::MAX, 2, u64::MAX - 1), 1);
    }

    #[test]
    fn test_mod_inverse() {
        assert_eq!(mod_inverse(17, 60), Some(53));
        assert_eq!(mod_inverse(17, 3120), Some(2753));
        assert_eq!(mod_inverse(17, 34), None);
        assert_eq!(mod_inverse(6, 9), None);
    }

    #[test]
    fn test_gcd() {
        assert_eq!(gcd(17, 60), 1);
        assert_eq!(gcd(12, 18), 6);
        assert_eq!(gcd(0, 9), 9);
    }

    #[test]
    fn test_is_prime() {
        let primes: Vec<u64> = (0..60).filter(|&n| is_prime(n)).collect();
        assert_eq!(
            primes,
            vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59]
        );
        assert!(is_prime(2_147_483_647));
        assert!(is_prime(4_294_967_291));
        assert!(!is_prime(3_215_031_751)); // strong pseudoprime to bases 2, 3, 5, 7
        assert!(!is_prime(4_294_967_291 * 3));
    }
}
