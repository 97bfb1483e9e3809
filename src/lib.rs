//! Game Boy-style handheld emulator core
//!
//! This crate provides a platform-agnostic emulator core with a stable C ABI.
//! No OS APIs are used beyond ROM/save-file I/O at `init`/`deinit` time — the
//! per-tick hot path never touches the filesystem.
//!
//! # Architecture
//!
//! The emulator is organized into several modules:
//! - `machine`: owns every subsystem and drives `tick_m_cycle`
//! - `bus`: address decoding and I/O register dispatch
//! - `cpu`: SM83/LR35902 microcode engine
//! - `ppu`: dot-matrix LCD controller and pixel pipeline
//! - `cartridge`: ROM/RAM banking (MBC0/MBC1/MBC3) and the MBC3 RTC
//! - `timer`, `dma`, `interrupt`, `joypad`: the remaining memory-mapped peripherals
//!
//! # Memory Map
//!
//! | Address Range       | Region                         |
//! |----------------------|--------------------------------|
//! | 0x0000 - 0x3FFF      | Cartridge ROM bank 0            |
//! | 0x4000 - 0x7FFF      | Cartridge ROM bank N (switchable)|
//! | 0x8000 - 0x9FFF      | VRAM                            |
//! | 0xA000 - 0xBFFF      | Cartridge RAM (if present)      |
//! | 0xC000 - 0xDFFF      | Work RAM                        |
//! | 0xE000 - 0xFDFF      | Echo RAM (mirrors 0xC000-0xDDFF)|
//! | 0xFE00 - 0xFE9F      | OAM                             |
//! | 0xFEA0 - 0xFEFF      | Unusable                        |
//! | 0xFF00 - 0xFF7F      | I/O registers                   |
//! | 0xFF80 - 0xFFFE      | High RAM                        |
//! | 0xFFFF               | Interrupt enable                |

pub mod bus;
pub mod cartridge;
pub mod config;
pub mod cpu;
pub mod dma;
pub mod error;
pub mod interrupt;
pub mod joypad;
pub mod machine;
pub mod ppu;
pub mod timer;

use std::ffi::CStr;
use std::os::raw::c_char;
use std::path::Path;
use std::ptr;

pub use error::CoreError;
pub use machine::Machine;

/// Load a ROM, allocate a machine, and restore its save/RTC files if
/// present. On success writes the new handle through `out_handle` and
/// returns 0; on failure returns a negative status code and leaves
/// `*out_handle` untouched.
#[no_mangle]
pub extern "C" fn sys_init(rom_path: *const c_char, out_handle: *mut *mut Machine) -> i32 {
    if rom_path.is_null() || out_handle.is_null() {
        return -3;
    }

    let path_str = match unsafe { CStr::from_ptr(rom_path) }.to_str() {
        Ok(s) => s,
        Err(_) => return -3,
    };

    match Machine::init(Path::new(path_str)) {
        Ok(machine) => {
            unsafe {
                *out_handle = Box::into_raw(Box::new(machine));
            }
            0
        }
        Err(e) => {
            log::error!("sys_init failed: {e}");
            error::status_code(&e)
        }
    }
}

/// Persist the machine's save/RTC state and free it.
/// Safe to call with a null handle.
#[no_mangle]
pub extern "C" fn sys_deinit(handle: *mut Machine) -> i32 {
    if handle.is_null() {
        return 0;
    }

    let mut machine = unsafe { Box::from_raw(handle) };
    match machine.deinit() {
        Ok(()) => 0,
        Err(e) => {
            log::error!("sys_deinit failed: {e}");
            error::status_code(&e)
        }
    }
}

/// Advance the machine by exactly one M-cycle.
#[no_mangle]
pub extern "C" fn sys_tick(handle: *mut Machine) {
    if handle.is_null() {
        return;
    }
    unsafe { &mut *handle }.tick_m_cycle();
}

/// Apply the input snapshot accumulated since the last call.
#[no_mangle]
pub extern "C" fn sys_start_frame(handle: *mut Machine) {
    if handle.is_null() {
        return;
    }
    unsafe { &mut *handle }.start_frame();
}

/// Set the host-facing button mask (bit order: START,SELECT,B,A,DOWN,UP,LEFT,RIGHT, 1=pressed).
#[no_mangle]
pub extern "C" fn sys_set_input(handle: *mut Machine, button_mask: u8) {
    if handle.is_null() {
        return;
    }
    unsafe { &mut *handle }.set_input(button_mask);
}

/// Pointer to the 160x144 ARGB8888 frame buffer, owned by the machine.
/// Returns null if the handle is null.
#[no_mangle]
pub extern "C" fn sys_get_frame_buffer(handle: *const Machine) -> *const u32 {
    if handle.is_null() {
        return ptr::null();
    }
    unsafe { &*handle }.frame_buffer().as_ptr()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::io::Write;

    fn write_blank_rom(path: &Path) {
        let mut rom = vec![0u8; 1 << 15];
        rom[0x147] = 0x00;
        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(&rom).unwrap();
    }

    #[test]
    fn init_tick_deinit_round_trip() {
        let path = std::env::temp_dir().join("sys_init_tick_deinit.gb");
        write_blank_rom(&path);
        let c_path = CString::new(path.to_str().unwrap()).unwrap();

        let mut handle: *mut Machine = ptr::null_mut();
        assert_eq!(sys_init(c_path.as_ptr(), &mut handle), 0);
        assert!(!handle.is_null());

        sys_tick(handle);
        sys_set_input(handle, 0);
        sys_start_frame(handle);

        let fb = sys_get_frame_buffer(handle);
        assert!(!fb.is_null());

        assert_eq!(sys_deinit(handle), 0);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn null_handles_are_harmless() {
        sys_tick(ptr::null_mut());
        sys_start_frame(ptr::null_mut());
        sys_set_input(ptr::null_mut(), 0);
        assert!(sys_get_frame_buffer(ptr::null()).is_null());
        assert_eq!(sys_deinit(ptr::null_mut()), 0);
    }

    #[test]
    fn init_rejects_missing_rom() {
        let c_path = CString::new("/nonexistent/path/to/rom.gb").unwrap();
        let mut handle: *mut Machine = ptr::null_mut();
        assert!(sys_init(c_path.as_ptr(), &mut handle) < 0);
        assert!(handle.is_null());
    }
}
