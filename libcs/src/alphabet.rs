use phf::phf_map;

pub const UTF8_SPACE: u8 = 32;

pub const AMINO_ALPHABET: [&str; 20] = [
    "A", "C", "D", "E", "F", "G", "H", "I", "K", "L", "M", "N", "P", "Q", "R", "S", "T", "V", "W",
    "Y",
];

pub const DNA_ALPHABET: [&str; 4] = ["A", "C", "G", "T"];

/// Digital index of the amino-acid any-symbol ("X"). Degenerate
/// letters all collapse onto it, so `digit >= 20` identifies a
/// non-concrete residue.
pub const AMINO_ANY: u8 = 20;

/// Digital index of the nucleotide any-symbol ("N").
pub const DNA_ANY: u8 = 4;

pub const UTF8_TO_DIGITAL_AMINO: phf::Map<u8, u8> = phf_map! {
    // upper case
    65u8 => 0,    // A
    67u8 => 1,    // C
    68u8 => 2,    // D
    69u8 => 3,    // E
    70u8 => 4,    // F
    71u8 => 5,    // G
    72u8 => 6,    // H
    73u8 => 7,    // I
    75u8 => 8,    // K
    76u8 => 9,    // L
    77u8 => 10,   // M
    78u8 => 11,   // N
    80u8 => 12,   // P
    81u8 => 13,   // Q
    82u8 => 14,   // R
    83u8 => 15,   // S
    84u8 => 16,   // T
    86u8 => 17,   // V
    87u8 => 18,   // W
    89u8 => 19,   // Y
    // lower case
    97u8 => 0,    // a
    99u8 => 1,    // c
    100u8 => 2,   // d
    101u8 => 3,   // e
    102u8 => 4,   // f
    103u8 => 5,   // g
    104u8 => 6,   // h
    105u8 => 7,   // i
    107u8 => 8,   // k
    108u8 => 9,   // l
    109u8 => 10,  // m
    110u8 => 11,  // n
    112u8 => 12,  // p
    113u8 => 13,  // q
    114u8 => 14,  // r
    115u8 => 15,  // s
    116u8 => 16,  // t
    118u8 => 17,  // v
    119u8 => 18,  // w
    121u8 => 19,  // y
    // degenerate characters all map onto the any-symbol
    88u8 => 20,   // X
    120u8 => 20,  // x
    66u8 => 20,   // B
    98u8 => 20,   // b
    90u8 => 20,   // Z
    122u8 => 20,  // z
    74u8 => 20,   // J
    106u8 => 20,  // j
    79u8 => 20,   // O
    111u8 => 20,  // o
    85u8 => 20,   // U
    117u8 => 20,  // u
};

pub const AMINO_INVERSE_MAP: phf::Map<u8, u8> = phf_map! {
    0u8  => 65,   // A
    1u8  => 67,   // C
    2u8  => 68,   // D
    3u8  => 69,   // E
    4u8  => 70,   // F
    5u8  => 71,   // G
    6u8  => 72,   // H
    7u8  => 73,   // I
    8u8  => 75,   // K
    9u8  => 76,   // L
    10u8 => 77,   // M
    11u8 => 78,   // N
    12u8 => 80,   // P
    13u8 => 81,   // Q
    14u8 => 82,   // R
    15u8 => 83,   // S
    16u8 => 84,   // T
    17u8 => 86,   // V
    18u8 => 87,   // W
    19u8 => 89,   // Y
    20u8 => 88,   // X
};

pub const UTF8_TO_DIGITAL_DNA: phf::Map<u8, u8> = phf_map! {
    65u8 => 0,    // A
    67u8 => 1,    // C
    71u8 => 2,    // G
    84u8 => 3,    // T
    97u8 => 0,    // a
    99u8 => 1,    // c
    103u8 => 2,   // g
    116u8 => 3,   // t
    78u8 => 4,    // N
    110u8 => 4,   // n
};

pub const DNA_INVERSE_MAP: phf::Map<u8, u8> = phf_map! {
    0u8 => 65,    // A
    1u8 => 67,    // C
    2u8 => 71,    // G
    3u8 => 84,    // T
    4u8 => 78,    // N
};

pub const AMINO_BACKGROUND_FREQUENCIES: [f64; 20] = [
    0.0787945, // A
    0.0151600, // C
    0.0535222, // D
    0.0668298, // E
    0.0397062, // F
    0.0695071, // G
    0.0229198, // H
    0.0590092, // I
    0.0594422, // K
    0.0963728, // L
    0.0237718, // M
    0.0414386, // N
    0.0482904, // P
    0.0395639, // Q
    0.0540978, // R
    0.0683364, // S
    0.0540687, // T
    0.0673417, // V
    0.0114135, // W
    0.0304133, // Y
];

pub const DNA_BACKGROUND_FREQUENCIES: [f64; 4] = [0.25, 0.25, 0.25, 0.25];

/// The sequence alphabet a model is built over. Threaded through
/// constructors instead of living in a global.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Alphabet {
    #[default]
    Amino,
    Dna,
}

impl Alphabet {
    pub fn size(&self) -> usize {
        match self {
            Alphabet::Amino => 20,
            Alphabet::Dna => 4,
        }
    }

    /// Digital index of the any-symbol; compares >= size() for
    /// ordinary letters.
    pub fn any(&self) -> u8 {
        match self {
            Alphabet::Amino => AMINO_ANY,
            Alphabet::Dna => DNA_ANY,
        }
    }

    pub fn to_digital(&self, utf8_byte: u8) -> Option<u8> {
        match self {
            Alphabet::Amino => UTF8_TO_DIGITAL_AMINO.get(&utf8_byte).copied(),
            Alphabet::Dna => UTF8_TO_DIGITAL_DNA.get(&utf8_byte).copied(),
        }
    }

    pub fn to_utf8(&self, digital_byte: u8) -> Option<u8> {
        match self {
            Alphabet::Amino => AMINO_INVERSE_MAP.get(&digital_byte).copied(),
            Alphabet::Dna => DNA_INVERSE_MAP.get(&digital_byte).copied(),
        }
    }

    pub fn background(&self) -> &'static [f64] {
        match self {
            Alphabet::Amino => &AMINO_BACKGROUND_FREQUENCIES,
            Alphabet::Dna => &DNA_BACKGROUND_FREQUENCIES,
        }
    }

    /// The tab-separated letter ruler written above serialized
    /// profile bodies.
    pub fn ruler(&self) -> String {
        let letters: &[&str] = match self {
            Alphabet::Amino => &AMINO_ALPHABET,
            Alphabet::Dna => &DNA_ALPHABET,
        };
        letters.join("\t")
    }

    pub fn from_size(size: usize) -> Option<Self> {
        match size {
            20 => Some(Alphabet::Amino),
            4 => Some(Alphabet::Dna),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amino_round_trip() {
        for digit in 0..20u8 {
            let byte = Alphabet::Amino.to_utf8(digit).unwrap();
            assert_eq!(Alphabet::Amino.to_digital(byte), Some(digit));
        }
    }

    #[test]
    fn test_degenerate_maps_to_any() {
        for byte in [b'X', b'B', b'Z', b'J', b'O', b'U', b'x'] {
            assert_eq!(Alphabet::Amino.to_digital(byte), Some(AMINO_ANY));
        }
    }

    #[test]
    fn test_backgrounds_sum_to_one() {
        let sum: f64 = AMINO_BACKGROUND_FREQUENCIES.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
        let sum: f64 = DNA_BACKGROUND_FREQUENCIES.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }
}
