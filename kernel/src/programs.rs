//! Embedded user programs.
//!
//! Flat, position-independent i386 images. Each locates its message with
//! a `call`/`pop` pair, so the same bytes run from any code region.

/// A program image baked into the kernel.
#[derive(Debug, Clone, Copy)]
pub struct Program {
    pub name: &'static str,
    pub image: &'static [u8],
}

/// Programs started at boot, in slot order.
pub static MANIFEST: &[Program] = &[
    Program {
        name: "hello",
        image: &HELLO,
    },
    Program {
        name: "selfcheck",
        image: &SELFCHECK,
    },
];

const HELLO_MSG: &[u8] = b"Hello from user mode!\n";

/// write(1, msg, len); exit(0)
const HELLO_CODE: [u8; 37] = [
    0xE8, 0x00, 0x00, 0x00, 0x00, // call $+5
    0x59, // pop ecx
    0x83, 0xC1, 37 - 5, // add ecx, msg - 5
    0xB8, 0x03, 0x00, 0x00, 0x00, // mov eax, SYS_WRITE
    0xBB, 0x01, 0x00, 0x00, 0x00, // mov ebx, 1
    0xBA, HELLO_MSG.len() as u8, 0x00, 0x00, 0x00, // mov edx, len
    0xCD, 0x80, // int 0x80
    0xB8, 0x01, 0x00, 0x00, 0x00, // mov eax, SYS_EXIT
    0x31, 0xDB, // xor ebx, ebx
    0xCD, 0x80, // int 0x80
    0xEB, 0xFE, // jmp $
];

pub static HELLO: [u8; HELLO_CODE.len() + HELLO_MSG.len()] = concat(&HELLO_CODE, HELLO_MSG);

const SELFCHECK_MSG: &[u8] = b"[SELFCHECK] MiniOS user-mode self-check passed!\n";

/// getpid() != 0 or exit(1); write(1, msg, len); exit(0)
const SELFCHECK_CODE: [u8; 62] = [
    0xB8, 0x14, 0x00, 0x00, 0x00, // mov eax, SYS_GETPID
    0xCD, 0x80, // int 0x80
    0x85, 0xC0, // test eax, eax
    0x74, 48 - 11, // jz fail
    0xE8, 0x00, 0x00, 0x00, 0x00, // call $+5
    0x59, // pop ecx
    0x83, 0xC1, 62 - 16, // add ecx, msg - 16
    0xB8, 0x03, 0x00, 0x00, 0x00, // mov eax, SYS_WRITE
    0xBB, 0x01, 0x00, 0x00, 0x00, // mov ebx, 1
    0xBA, SELFCHECK_MSG.len() as u8, 0x00, 0x00, 0x00, // mov edx, len
    0xCD, 0x80, // int 0x80
    0xB8, 0x01, 0x00, 0x00, 0x00, // mov eax, SYS_EXIT
    0x31, 0xDB, // xor ebx, ebx
    0xCD, 0x80, // int 0x80
    0xEB, 0xFE, // jmp $
    // fail:
    0xB8, 0x01, 0x00, 0x00, 0x00, // mov eax, SYS_EXIT
    0xBB, 0x01, 0x00, 0x00, 0x00, // mov ebx, 1
    0xCD, 0x80, // int 0x80
    0xEB, 0xFE, // jmp $
];

pub static SELFCHECK: [u8; SELFCHECK_CODE.len() + SELFCHECK_MSG.len()] =
    concat(&SELFCHECK_CODE, SELFCHECK_MSG);

const fn concat<const N: usize>(code: &[u8], msg: &[u8]) -> [u8; N] {
    assert!(code.len() + msg.len() == N);
    assert!(msg.len() < 0x80);
    let mut out = [0u8; N];
    let mut i = 0;
    while i < code.len() {
        out[i] = code[i];
        i += 1;
    }
    let mut j = 0;
    while j < msg.len() {
        out[i + j] = msg[j];
        j += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_order() {
        let names: Vec<_> = MANIFEST.iter().map(|p| p.name).collect();
        assert_eq!(names, ["hello", "selfcheck"]);
    }

    #[test]
    fn test_messages_follow_code() {
        assert_eq!(&HELLO[37..], HELLO_MSG);
        assert_eq!(&SELFCHECK[62..], SELFCHECK_MSG);
        assert_eq!(HELLO_MSG.len(), 22);
        assert_eq!(SELFCHECK_MSG.len(), 48);
    }
}
