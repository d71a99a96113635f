pub mod user_access;

use alloc::sync::Arc;
use system_error::SystemError;

use crate::driver::base::char::cdev_get;
use crate::filesystem::devfs::devfs_find;
use crate::filesystem::vfs::{
    file::{File, FileMode},
    FileType,
};
use crate::mm::VirtAddr;

/// 设备文件所在的目录前缀
const DEV_PATH_PREFIX: &str = "/dev/";

/// 系统调用门面：用户程序对设备文件发起的四种文件操作都从这里进入
pub struct Syscall;

impl Syscall {
    /// @brief 打开设备文件，建立一次会话
    ///
    /// 先在devfs中找到设备节点，再根据节点上记录的设备号从字符设备表
    /// 中取出注册时挂入的回调表，对回调表发起open。
    ///
    /// ## 参数
    ///
    /// - `path`：设备文件的路径（如`/dev/memchar`）
    /// - `mode`：打开模式
    ///
    /// ## 返回值
    ///
    /// - `Ok(Arc<File>)`: 会话对象
    /// - `Err(SystemError)`: 错误码
    pub fn open(path: &str, mode: FileMode) -> Result<Arc<File>, SystemError> {
        let name = path
            .strip_prefix(DEV_PATH_PREFIX)
            .ok_or(SystemError::ENOENT)?;
        let node = devfs_find(name)?;

        let metadata = node.metadata()?;
        if metadata.file_type != FileType::CharDevice {
            return Err(SystemError::ENXIO);
        }

        let device = cdev_get(metadata.raw_dev)?;
        return File::new(device.inode(), mode);
    }

    /// @brief 从设备读取数据到调用方自有的缓冲区
    ///
    /// ## 参数
    ///
    /// - `file`：会话对象
    /// - `buf`：调用方缓冲区的起始地址
    /// - `len`：请求的字节数
    pub fn read(file: &File, buf: *mut u8, len: usize) -> Result<usize, SystemError> {
        return file.read(len, VirtAddr::new(buf as usize));
    }

    /// @brief 把调用方自有缓冲区中的数据写入设备
    ///
    /// ## 参数
    ///
    /// - `file`：会话对象
    /// - `buf`：调用方缓冲区的起始地址
    /// - `len`：要写入的字节数
    pub fn write(file: &File, buf: *const u8, len: usize) -> Result<usize, SystemError> {
        return file.write(len, VirtAddr::new(buf as usize));
    }

    /// @brief 关闭会话
    pub fn close(file: Arc<File>) -> Result<(), SystemError> {
        return file.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::memchar::{memchar_driver_exit, memchar_driver_init};
    use crate::filesystem::devfs::devfs_init;
    use crate::test_support;

    #[test]
    fn test_open_rejects_unknown_paths() {
        let _guard = test_support::lock();
        devfs_init().unwrap();

        assert_eq!(
            Syscall::open("/dev/no-such-device", FileMode::O_RDWR).err(),
            Some(SystemError::ENOENT)
        );
        assert_eq!(
            Syscall::open("/tmp/not-a-device", FileMode::O_RDWR).err(),
            Some(SystemError::ENOENT)
        );
        // `/dev/`本身是目录，不是字符设备
        assert_eq!(
            Syscall::open("/dev/", FileMode::O_RDWR).err(),
            Some(SystemError::ENXIO)
        );
    }

    #[test]
    fn test_open_mode_is_enforced() {
        let _guard = test_support::lock();
        devfs_init().unwrap();
        memchar_driver_exit().unwrap();
        memchar_driver_init().unwrap();

        let mut buf = [0u8; 2048];

        let write_only = Syscall::open("/dev/memchar", FileMode::O_WRONLY).unwrap();
        assert_eq!(
            Syscall::read(&write_only, buf.as_mut_ptr(), buf.len()).err(),
            Some(SystemError::EBADF)
        );
        assert_eq!(Syscall::write(&write_only, buf.as_ptr(), 8), Ok(8));
        Syscall::close(write_only).unwrap();

        let read_only = Syscall::open("/dev/memchar", FileMode::O_RDONLY).unwrap();
        assert_eq!(
            Syscall::write(&read_only, buf.as_ptr(), 8).err(),
            Some(SystemError::EBADF)
        );
        assert_eq!(Syscall::read(&read_only, buf.as_mut_ptr(), buf.len()), Ok(1024));
        Syscall::close(read_only).unwrap();

        memchar_driver_exit().unwrap();
    }
}
