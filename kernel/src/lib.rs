#![cfg_attr(not(test), no_std)]
#![allow(clippy::needless_return)]

#[macro_use]
extern crate alloc;
#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate lazy_static;

#[macro_use]
pub mod libs;

pub mod driver;
pub mod filesystem;
pub mod init;
pub mod mm;
pub mod syscall;
pub mod time;

/// 测试环境下串行化涉及全局注册表（设备号表、设备类表、devfs）的测试
#[cfg(test)]
pub(crate) mod test_support {
    static REGISTRY_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    pub(crate) fn lock() -> std::sync::MutexGuard<'static, ()> {
        return REGISTRY_TEST_LOCK
            .lock()
            .unwrap_or_else(|e| e.into_inner());
    }
}
