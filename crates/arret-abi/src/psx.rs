//! PSX-specific payloads carried by misc events.

/// Payload of a "GP0"/"GP1"/"GPU Post" misc event.
///
/// Wire layout (little-endian): `u8 port, u8 source, u16 word_count,
/// u32 pc, u32 words[16]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuPost {
    /// 0 = GP0, 1 = GP1.
    pub port: u8,
    /// 0 = CPU, 2 = DMA channel 2.
    pub source: u8,
    /// Number of valid entries in `words`.
    pub word_count: u16,
    /// R3000A program counter at submission time.
    pub pc: u32,
    pub words: [u32; 16],
}

impl GpuPost {
    pub const WIRE_SIZE: usize = 1 + 1 + 2 + 4 + 16 * 4;

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < Self::WIRE_SIZE {
            return None;
        }
        let mut words = [0u32; 16];
        for (i, word) in words.iter_mut().enumerate() {
            let off = 8 + i * 4;
            *word = u32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]]);
        }
        Some(Self {
            port: data[0],
            source: data[1],
            word_count: u16::from_le_bytes([data[2], data[3]]),
            pc: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
            words,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::WIRE_SIZE);
        out.push(self.port);
        out.push(self.source);
        out.extend_from_slice(&self.word_count.to_le_bytes());
        out.extend_from_slice(&self.pc.to_le_bytes());
        for word in &self.words {
            out.extend_from_slice(&word.to_le_bytes());
        }
        out
    }

    /// The command words actually present.
    pub fn words(&self) -> &[u32] {
        &self.words[..usize::from(self.word_count).min(16)]
    }
}

/// VRAM geometry: 1024 halfwords by 512 lines, 1 MiB total.
pub const VRAM_WIDTH: usize = 1024;
pub const VRAM_HEIGHT: usize = 512;
pub const VRAM_BYTES: usize = VRAM_WIDTH * VRAM_HEIGHT * 2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_post_round_trips() {
        let mut words = [0u32; 16];
        words[0] = 0x0200_00FF;
        words[1] = 0x0010_0020;
        let post = GpuPost {
            port: 0,
            source: 2,
            word_count: 2,
            pc: 0x8001_2345,
            words,
        };
        let bytes = post.to_bytes();
        assert_eq!(bytes.len(), GpuPost::WIRE_SIZE);
        assert_eq!(GpuPost::from_bytes(&bytes), Some(post));
        assert_eq!(post.words(), &words[..2]);
    }

    #[test]
    fn gpu_post_rejects_short_buffers() {
        assert!(GpuPost::from_bytes(&[0u8; 8]).is_none());
    }
}
