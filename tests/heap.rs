#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(rust386::test_runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;

use core::panic::PanicInfo;

use rust386::internal::memory::heap;

#[unsafe(no_mangle)]
extern "C" fn kernel_main(_magic: u32, _mboot_info: u32) -> ! {
    rust386::init();

    test_main();
    loop {}
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    rust386::test_panic_handler(info)
}

use alloc::boxed::Box;

#[test_case]
fn simple_allocation() {
    let heap_value_1 = Box::new(41);
    let heap_value_2 = Box::new(13);
    assert_eq!(*heap_value_1, 41);
    assert_eq!(*heap_value_2, 13);
}

use alloc::vec::Vec;

#[test_case]
fn large_vec() {
    let n: u32 = 1000;
    let mut vec = Vec::new();
    for i in 0..n {
        vec.push(i);
    }
    assert_eq!(vec.iter().sum::<u32>(), (n - 1) * n / 2);
}

#[test_case]
fn many_boxes() {
    for i in 0..10000 {
        let x = Box::new(i);
        assert_eq!(*x, i);
    }
}

#[test_case]
fn raw_malloc_scenario() {
    let p1 = heap::malloc(12345);
    let p2 = heap::malloc(54321);
    let p3 = heap::malloc(13331);
    heap::free(p2);
    let p4 = heap::malloc(1000);
    assert!(!p4.is_null());
    assert_ne!(p4, p1);
    assert_ne!(p4, p3);
    heap::free(p1);
    heap::free(p3);
    heap::free(p4);
}
