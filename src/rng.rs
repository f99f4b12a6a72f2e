//! Seedable Random Number Generation
//!
//! Every stochastic module (noise, analog drift, the ladder noise floor,
//! random voltages) owns its own [`Rng`]. A generator is a plain value, so
//! drawing from it on the audio thread never locks or allocates.
//!
//! The algorithm is Xorshift128+: fast, with a period of 2^128 - 1 and enough
//! statistical quality for audio. Seeds come from
//! [`EngineSettings::seed`](crate::persist::EngineSettings) when fixed, or from
//! operating-system entropy through `rand` otherwise. Each module derives an
//! independent stream with [`Rng::fork`].

/// A seedable random number generator using Xorshift128+.
#[derive(Debug, Clone, Copy)]
pub struct Rng {
    s0: u64,
    s1: u64,
    /// Second Box-Muller output waiting to be returned
    spare_normal: Option<f32>,
}

impl Rng {
    /// Create a generator from raw state words. Both zero is remapped.
    #[inline]
    pub const fn new(s0: u64, s1: u64) -> Self {
        let s0 = if s0 == 0 && s1 == 0 { 1 } else { s0 };
        Self {
            s0,
            s1,
            spare_normal: None,
        }
    }

    /// Create a generator from a single 64-bit seed.
    #[inline]
    pub fn from_seed(seed: u64) -> Self {
        let s0 = splitmix64(seed);
        let s1 = splitmix64(seed.wrapping_add(0x9e3779b97f4a7c15));
        Self::new(s0, s1)
    }

    /// Create a generator seeded from operating-system entropy.
    pub fn from_entropy() -> Self {
        Self::from_seed(rand::random::<u64>())
    }

    /// Seeded when `seed` is given, entropy otherwise.
    pub fn from_optional_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::from_seed(seed),
            None => Self::from_entropy(),
        }
    }

    /// Derive an independent generator, advancing this one.
    ///
    /// Used to hand each module its own stream from a shared engine seed.
    pub fn fork(&mut self) -> Self {
        let mut child = *self;
        child.jump();
        child.spare_normal = None;
        self.next_u64();
        child
    }

    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.s0;
        let mut s1 = self.s1;
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.s0 = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.s1 = s1.rotate_left(37);

        result
    }

    /// Uniform f32 in [0, 1)
    #[inline]
    pub fn uniform(&mut self) -> f32 {
        // 24 mantissa bits
        (self.next_u64() >> 40) as f32 * (1.0 / (1u64 << 24) as f32)
    }

    /// Uniform f32 in [-1, 1)
    #[inline]
    pub fn uniform_bipolar(&mut self) -> f32 {
        self.uniform() * 2.0 - 1.0
    }

    /// Standard normal draw (mean 0, deviation 1), Box-Muller
    #[inline]
    pub fn normal(&mut self) -> f32 {
        if let Some(spare) = self.spare_normal.take() {
            return spare;
        }
        // Avoid ln(0)
        let u1 = 1.0 - self.uniform();
        let u2 = self.uniform();
        let radius = (-2.0 * u1.ln()).sqrt();
        let theta = std::f32::consts::TAU * u2;
        self.spare_normal = Some(radius * theta.sin());
        radius * theta.cos()
    }

    #[inline]
    pub fn next_bool(&mut self) -> bool {
        self.next_u64() & 1 == 1
    }

    /// Jump the state forward by 2^64 steps.
    pub fn jump(&mut self) {
        const JUMP: [u64; 2] = [0xdf900294d8f554a5, 0x170865df4b3201fc];

        let mut s0 = 0u64;
        let mut s1 = 0u64;

        for jump_val in JUMP.iter() {
            for b in 0..64 {
                if (jump_val >> b) & 1 != 0 {
                    s0 ^= self.s0;
                    s1 ^= self.s1;
                }
                self.next_u64();
            }
        }

        self.s0 = s0;
        self.s1 = s1;
    }
}

impl Default for Rng {
    fn default() -> Self {
        Self::from_entropy()
    }
}

#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e3779b97f4a7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d049bb133111eb);
    x ^ (x >> 31)
}
