use log::info;
use system_error::SystemError;

use crate::driver::memchar::{memchar_driver_exit, memchar_driver_init};
use crate::filesystem::devfs::devfs_init;

/// @brief 内核子系统初始化：先挂载devfs，再注册驱动。
///
/// 任何一步失败都会使加载中止，错误向上传播给加载方。
pub fn kernel_init() -> Result<(), SystemError> {
    devfs_init()?;
    memchar_driver_init()?;
    info!("kernel subsystems initialized.");
    return Ok(());
}

/// @brief 内核子系统退出：按初始化的相反顺序注销驱动
pub fn kernel_exit() -> Result<(), SystemError> {
    memchar_driver_exit()?;
    return Ok(());
}
