//! Memory management: the kernel heap and the paging bootstrap.

pub mod heap;
pub mod paging;

unsafe extern "C" {
    #[link_name = "__kernel_start"]
    static KERNEL_START: u8;
    #[link_name = "__kernel_end"]
    static KERNEL_END: u8;
}

/// First byte of the kernel image (linker-provided).
pub fn kernel_start() -> usize {
    &raw const KERNEL_START as usize
}

/// First byte past the kernel image (linker-provided, 4 KiB aligned).
pub fn kernel_end() -> usize {
    &raw const KERNEL_END as usize
}

/// Set up the heap right after the kernel image. Paging comes later in
/// the boot sequence, once there is a heap to carve page tables from.
pub fn init() {
    heap::init(kernel_end());
}
