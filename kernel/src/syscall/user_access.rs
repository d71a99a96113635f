//! 这个文件用于放置一些内核态访问用户态数据的函数

use crate::mm::{verify_area, VirtAddr};
use system_error::SystemError;

/// 把内核空间的数据拷贝到用户空间
///
/// ## 参数
///
/// - `dest`：用户空间的目标地址
/// - `src`：内核空间的源缓冲区
///
/// ## 返回值
///
/// 返回拷贝的数据长度
///
/// ## 错误
///
/// - `EFAULT`：目标地址不合法
pub unsafe fn copy_to_user(dest: VirtAddr, src: &[u8]) -> Result<usize, SystemError> {
    verify_area(dest, src.len()).map_err(|_| SystemError::EFAULT)?;

    let p = dest.data() as *mut u8;
    // 拷贝数据
    p.copy_from_nonoverlapping(src.as_ptr(), src.len());
    return Ok(src.len());
}

/// 从用户空间拷贝数据到内核空间
pub unsafe fn copy_from_user(dst: &mut [u8], src: VirtAddr) -> Result<usize, SystemError> {
    verify_area(src, dst.len()).map_err(|_| SystemError::EFAULT)?;

    let src: &[u8] = core::slice::from_raw_parts(src.data() as *const u8, dst.len());
    // 拷贝数据
    dst.copy_from_slice(src);

    return Ok(dst.len());
}

/// 用户空间缓冲区的读取器
///
/// 创建时校验整个缓冲区的可访问性，之后的每次拷贝都以创建时的窗口为界。
#[derive(Debug)]
pub struct UserBufferReader {
    addr: VirtAddr,
    len: usize,
}

impl UserBufferReader {
    /// 构造一个用户缓冲区读取器
    ///
    /// ## 参数
    ///
    /// - `src`：用户空间的缓冲区起始地址
    /// - `len`：缓冲区长度
    /// - `from_user`：是否校验地址来自用户空间
    ///
    /// ## 错误
    ///
    /// - `EFAULT`：缓冲区不在合法的用户地址范围内
    pub fn new(src: *const u8, len: usize, from_user: bool) -> Result<Self, SystemError> {
        let addr = VirtAddr::new(src as usize);
        if from_user {
            verify_area(addr, len).map_err(|_| SystemError::EFAULT)?;
        }
        return Ok(Self { addr, len });
    }

    /// 缓冲区的长度
    pub fn size(&self) -> usize {
        return self.len;
    }

    /// 从用户缓冲区的指定偏移处，拷贝`dst.len()`字节到内核缓冲区
    ///
    /// ## 错误
    ///
    /// - `EINVAL`：请求的窗口超出了创建时校验过的范围
    pub fn copy_from_user(&self, dst: &mut [u8], offset: usize) -> Result<usize, SystemError> {
        let end = offset
            .checked_add(dst.len())
            .ok_or(SystemError::EINVAL)?;
        if end > self.len {
            return Err(SystemError::EINVAL);
        }
        if dst.is_empty() {
            return Ok(0);
        }
        return unsafe { copy_from_user(dst, self.addr.add(offset)) };
    }
}

/// 用户空间缓冲区的写入器
#[derive(Debug)]
pub struct UserBufferWriter {
    addr: VirtAddr,
    len: usize,
}

impl UserBufferWriter {
    /// 构造一个用户缓冲区写入器
    ///
    /// ## 参数
    ///
    /// - `dest`：用户空间的缓冲区起始地址
    /// - `len`：缓冲区长度
    /// - `from_user`：是否校验地址来自用户空间
    ///
    /// ## 错误
    ///
    /// - `EFAULT`：缓冲区不在合法的用户地址范围内
    pub fn new(dest: *mut u8, len: usize, from_user: bool) -> Result<Self, SystemError> {
        let addr = VirtAddr::new(dest as usize);
        if from_user {
            verify_area(addr, len).map_err(|_| SystemError::EFAULT)?;
        }
        return Ok(Self { addr, len });
    }

    /// 缓冲区的长度
    pub fn size(&self) -> usize {
        return self.len;
    }

    /// 把内核缓冲区的数据写入到用户缓冲区的指定偏移处
    ///
    /// ## 错误
    ///
    /// - `EINVAL`：请求的窗口超出了创建时校验过的范围
    pub fn copy_to_user(&mut self, src: &[u8], offset: usize) -> Result<usize, SystemError> {
        let end = offset
            .checked_add(src.len())
            .ok_or(SystemError::EINVAL)?;
        if end > self.len {
            return Err(SystemError::EINVAL);
        }
        if src.is_empty() {
            return Ok(0);
        }
        return unsafe { copy_to_user(self.addr.add(offset), src) };
    }
}
