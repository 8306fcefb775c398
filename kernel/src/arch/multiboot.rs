//! Multiboot v1 handoff.
//!
//! The loader passes a magic value in `eax` and the physical address of a
//! [`MultibootInfo`] in `ebx`. The memory map it points at is turned into
//! a [`BootMemoryMap`] for the frame allocator.

use crate::memory::{BootMemoryMap, MemoryRegion};

/// Value a compliant loader leaves in `eax`.
pub const BOOTLOADER_MAGIC: u32 = 0x2BAD_B002;

/// Header magic the loader scans the image for.
pub const HEADER_MAGIC: u32 = 0x1BAD_B002;
/// Page-align modules and provide memory information.
pub const HEADER_FLAGS: u32 = 0x0000_0003;
pub const HEADER_CHECKSUM: u32 = 0u32.wrapping_sub(HEADER_MAGIC.wrapping_add(HEADER_FLAGS));

const INFO_MEMORY: u32 = 1 << 0;
const INFO_MEMORY_MAP: u32 = 1 << 6;

const MMAP_AVAILABLE: u32 = 1;
/// size(4) + base(8) + length(8) + type(4).
const MMAP_ENTRY_MIN: usize = 24;

/// Leading fields of the Multiboot information structure.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct MultibootInfo {
    pub flags: u32,
    pub mem_lower: u32,
    pub mem_upper: u32,
    pub boot_device: u32,
    pub cmdline: u32,
    pub mods_count: u32,
    pub mods_addr: u32,
    pub syms: [u32; 4],
    pub mmap_length: u32,
    pub mmap_addr: u32,
}

/// Boot handoff errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    BadMagic(u32),
    NoMemoryInfo,
}

impl core::fmt::Display for BootError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BadMagic(magic) => write!(f, "not loaded by a multiboot loader (magic {:#x})", magic),
            Self::NoMemoryInfo => write!(f, "loader provided no memory information"),
        }
    }
}

/// Build the memory map from the loader's information.
///
/// `mmap` is the raw memory-map buffer when the loader provided one.
/// Without it, `mem_lower`/`mem_upper` describe conventional and extended
/// memory and the hole between them is reserved.
pub fn memory_map(info: &MultibootInfo, mmap: Option<&[u8]>) -> Result<BootMemoryMap, BootError> {
    let mut map = BootMemoryMap::new(0);

    match mmap {
        Some(bytes) if info.flags & INFO_MEMORY_MAP != 0 => parse_mmap(bytes, &mut map),
        _ if info.flags & INFO_MEMORY != 0 => {
            let lower = info.mem_lower as u64 * 1024;
            let upper_start = 0x10_0000u64;
            map.push(MemoryRegion::usable(0, lower));
            map.push(MemoryRegion::reserved(lower, upper_start - lower));
            map.push(MemoryRegion::usable(upper_start, info.mem_upper as u64 * 1024));
        }
        _ => return Err(BootError::NoMemoryInfo),
    }

    map.total_memory = map.usable_end();
    Ok(map)
}

/// Append every entry of a raw Multiboot memory map to `map`.
///
/// Each entry starts with its own size, which excludes the size field.
fn parse_mmap(bytes: &[u8], map: &mut BootMemoryMap) {
    let mut offset = 0;
    while offset + MMAP_ENTRY_MIN <= bytes.len() {
        let field = |at: usize, len: usize| {
            let mut raw = [0u8; 8];
            raw[..len].copy_from_slice(&bytes[offset + at..offset + at + len]);
            u64::from_le_bytes(raw)
        };
        let size = field(0, 4) as usize;
        let base = field(4, 8);
        let len = field(12, 8);
        let kind = field(20, 4) as u32;

        let region = if kind == MMAP_AVAILABLE {
            MemoryRegion::usable(base, len)
        } else {
            MemoryRegion::reserved(base, len)
        };
        map.push(region);
        offset += size.max(MMAP_ENTRY_MIN - 4) + 4;
    }
}

/// Read the loader's information structure and memory map.
///
/// # Safety
///
/// `info_addr` must be the address the loader passed in `ebx`, still
/// identity mapped and untouched.
#[cfg(target_arch = "x86")]
pub unsafe fn from_loader(magic: u32, info_addr: u32) -> Result<BootMemoryMap, BootError> {
    if magic != BOOTLOADER_MAGIC {
        return Err(BootError::BadMagic(magic));
    }
    let info = unsafe { &*(info_addr as *const MultibootInfo) };
    let mmap = (info.flags & INFO_MEMORY_MAP != 0).then(|| unsafe {
        core::slice::from_raw_parts(info.mmap_addr as *const u8, info.mmap_length as usize)
    });
    memory_map(info, mmap)
}
