use ::core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use alloc::sync::Arc;
use system_error::SystemError;

use crate::driver::memchar::MemCharFilePrivateData;
use crate::libs::spinlock::SpinLock;
use crate::mm::VirtAddr;

use super::IndexNode;

bitflags! {
    /// 文件打开模式
    ///
    /// 最低2bit是访问权限
    pub struct FileMode: u32 {
        /// 以只读方式打开
        const O_RDONLY = 0o0;
        /// 以只写方式打开
        const O_WRONLY = 0o1;
        /// 以读写方式打开
        const O_RDWR = 0o2;
        /// 访问权限的掩码
        const O_ACCMODE = 0o3;
    }
}

impl FileMode {
    /// @brief 获取文件的访问模式的值
    #[inline]
    pub fn accmode(&self) -> u32 {
        return self.bits() & FileMode::O_ACCMODE.bits();
    }
}

/// 文件私有信息，由每一次打开所对应的具体文件系统或设备填充
#[derive(Debug)]
pub enum FilePrivateData {
    /// 内存字符设备的会话数据
    MemChar(MemCharFilePrivateData),
    /// 不需要文件私有信息
    Unused,
}

impl Default for FilePrivateData {
    fn default() -> Self {
        return Self::Unused;
    }
}

/// @brief 抽象文件结构体。
///
/// 一个File对应一次成功的打开，在打开和关闭之间的区间构成一次会话；
/// 会话期间的私有数据保存在private_data中，关闭时释放。
#[derive(Debug)]
pub struct File {
    inode: Arc<dyn IndexNode>,
    /// 对于文件，表示字节偏移量；对于文件夹，表示当前操作的子目录项偏移量
    offset: AtomicUsize,
    /// 文件的打开模式
    mode: FileMode,
    /// 文件是否已经被关闭。关闭只会发生一次
    closed: AtomicBool,
    /// 与这次打开相关联的私有信息
    private_data: SpinLock<FilePrivateData>,
}

impl File {
    /// @brief 创建一个新的文件对象
    ///
    /// @param inode 文件对象对应的inode
    /// @param mode 文件的打开模式
    ///
    /// 如果inode的open回调失败（例如设备无法为会话分配缓冲区），
    /// 则文件对象不会被创建，后续的读写也就无从发生。
    pub fn new(inode: Arc<dyn IndexNode>, mode: FileMode) -> Result<Arc<File>, SystemError> {
        let file = File {
            inode,
            offset: AtomicUsize::new(0),
            mode,
            closed: AtomicBool::new(false),
            private_data: SpinLock::new(FilePrivateData::default()),
        };
        file.inode.open(file.private_data.lock(), &mode)?;
        return Ok(Arc::new(file));
    }

    /// @brief 从文件中读取指定的字节数到目标缓冲区
    ///
    /// @param len 调用方请求的字节数
    /// @param buf 调用方地址空间中目标区域的起始地址
    ///
    /// @return Ok(usize) 传输的字节数
    /// @return Err(SystemError) 错误码
    pub fn read(&self, len: usize, buf: VirtAddr) -> Result<usize, SystemError> {
        self.readable()?;

        let r = self
            .inode
            .read_at(self.offset.load(Ordering::SeqCst), len, buf, self.private_data.lock())?;
        self.offset.fetch_add(r, Ordering::SeqCst);
        return Ok(r);
    }

    /// @brief 从源缓冲区向文件中写入指定的字节数
    ///
    /// @param len 要写入的字节数
    /// @param buf 调用方地址空间中源区域的起始地址
    ///
    /// @return Ok(usize) 传输的字节数
    /// @return Err(SystemError) 错误码
    pub fn write(&self, len: usize, buf: VirtAddr) -> Result<usize, SystemError> {
        self.writeable()?;

        let r = self
            .inode
            .write_at(self.offset.load(Ordering::SeqCst), len, buf, self.private_data.lock())?;
        self.offset.fetch_add(r, Ordering::SeqCst);
        return Ok(r);
    }

    /// @brief 获取文件的打开模式
    #[inline]
    pub fn mode(&self) -> FileMode {
        return self.mode;
    }

    /// @brief 获取文件指向的inode
    pub fn inode(&self) -> Arc<dyn IndexNode> {
        return self.inode.clone();
    }

    /// 判断当前文件是否可读
    #[inline]
    pub fn readable(&self) -> Result<(), SystemError> {
        // 暂无非阻塞-读一类的特殊模式，只需要判断访问权限
        if self.mode.accmode() == FileMode::O_WRONLY.bits() {
            return Err(SystemError::EBADF);
        }
        return Ok(());
    }

    /// 判断当前文件是否可写
    #[inline]
    pub fn writeable(&self) -> Result<(), SystemError> {
        if self.mode.accmode() == FileMode::O_RDONLY.bits() {
            return Err(SystemError::EBADF);
        }
        return Ok(());
    }

    /// @brief 关闭文件，释放本次打开所关联的私有数据。
    ///
    /// 关闭最多发生一次；显式关闭之后，文件对象析构时不会再次关闭。
    pub fn close(&self) -> Result<(), SystemError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        return self.inode.close(self.private_data.lock());
    }
}

impl Drop for File {
    fn drop(&mut self) {
        // 文件对象析构时关闭会话，忽略重复关闭
        self.close().ok();
    }
}
