/// Code reserved for "any base" / ambiguous calls.
pub const ANY_CODE: u8 = 15;

/// Highest valid quality score.
pub const MAX_QUALITY: u8 = 127;

const NT_DIMSIZE: usize = 32; //0b0011111 = 31 is largest value

////////////////
/// Only keep the lower bits
const fn reduce_base(b: u8) -> u8 {
    b & 0b0011111
}

////////////////
/// ASCII nucleotide -> 4-bit code, BAM nibble style (A=1 C=2 G=4 T=8, N=15).
/// Anything unrecognized maps to the ambiguous code.
const NT_ENCODE: [u8; NT_DIMSIZE] = {
    let mut table = [ANY_CODE; NT_DIMSIZE];
    table[reduce_base(b'A') as usize] = 1;
    table[reduce_base(b'C') as usize] = 2;
    table[reduce_base(b'G') as usize] = 4;
    table[reduce_base(b'T') as usize] = 8;
    table[reduce_base(b'N') as usize] = ANY_CODE;
    table
};

const NT_DECODE: [u8; 16] = [
    b'=', b'A', b'C', b'M', b'G', b'R', b'S', b'V', b'T', b'W', b'Y', b'H', b'K', b'D', b'B', b'N',
];

#[inline]
pub fn encode_base(b: u8) -> u8 {
    NT_ENCODE[reduce_base(b) as usize]
}

#[inline]
pub fn decode_base(code: u8) -> u8 {
    NT_DECODE[(code & 0x0f) as usize]
}

///////////////////////////////
/// One segment's worth of sequence: parallel base-code and quality arrays.
///
/// Codes live in 0..=15 with 15 reserved for "any"; qualities in 0..=127.
/// A fragment is created empty, filled while a record is read, then cleared
/// and reused for the next record. Capacity is kept across `clear` so the
/// per-record path does not allocate.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Fragment {
    code: Vec<u8>,
    quality: Vec<u8>,
}

impl Fragment {
    pub fn new() -> Fragment {
        Fragment {
            code: Vec::new(),
            quality: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Fragment {
        Fragment {
            code: Vec::with_capacity(capacity),
            quality: Vec::with_capacity(capacity),
        }
    }

    ///////////////////////////////
    /// Build a registry fragment from an ASCII sequence, all bases at the
    /// given quality.
    pub fn from_ascii(seq: &[u8], quality: u8) -> Fragment {
        let mut f = Fragment::with_capacity(seq.len());
        for &b in seq {
            f.append(encode_base(b), quality);
        }
        f
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    #[inline]
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    #[inline]
    pub fn quality(&self) -> &[u8] {
        &self.quality
    }

    #[inline]
    pub fn clear(&mut self) {
        self.code.clear();
        self.quality.clear();
    }

    #[inline]
    pub fn append(&mut self, code: u8, quality: u8) {
        debug_assert!(quality <= MAX_QUALITY);
        self.code.push(code & 0x0f);
        self.quality.push(quality);
    }

    ///////////////////////////////
    /// Replace the content with the given parallel arrays.
    pub fn fill(&mut self, codes: &[u8], qualities: &[u8]) {
        assert_eq!(
            codes.len(),
            qualities.len(),
            "code and quality arrays must be parallel"
        );
        self.clear();
        self.code.extend_from_slice(codes);
        self.quality.extend_from_slice(qualities);
        for c in self.code.iter_mut() {
            *c &= 0x0f;
        }
    }

    ///////////////////////////////
    /// Fill from ASCII bases and phred+0 qualities (already rescaled).
    pub fn fill_ascii(&mut self, seq: &[u8], qualities: &[u8]) {
        assert_eq!(
            seq.len(),
            qualities.len(),
            "sequence and quality must be parallel"
        );
        self.clear();
        for (&b, &q) in seq.iter().zip(qualities.iter()) {
            self.append(encode_base(b), q.min(MAX_QUALITY));
        }
    }

    ///////////////////////////////
    /// Mask low-confidence calls: any base below the quality threshold
    /// becomes the ambiguous code. Threshold 0 disables masking.
    pub fn mask(&mut self, threshold: u8) {
        if threshold == 0 {
            return;
        }
        for (c, &q) in self.code.iter_mut().zip(self.quality.iter()) {
            if q < threshold {
                *c = ANY_CODE;
            }
        }
    }

    pub fn to_ascii(&self) -> Vec<u8> {
        self.code.iter().map(|&c| decode_base(c)).collect()
    }
}

impl std::fmt::Display for Fragment {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.to_ascii()))
    }
}
