use core::cell::Cell;

use alloc::{
    string::ToString,
    sync::{Arc, Weak},
    vec::Vec,
};
use defer::defer;
use ida::IdAllocator;
use log::{debug, error, info};
use system_error::SystemError;

use crate::{
    driver::base::{
        char::{
            alloc_chrdev_region, cdev_add, cdev_del, unregister_chrdev_region, CharDevice,
        },
        class::{class_create, class_destroy, DeviceClass},
        device::{device_number::DeviceNumber, IdTable},
    },
    filesystem::{
        devfs::{DevFS, DeviceINode},
        vfs::{
            core::generate_inode_id, file::FileMode, FilePrivateData, FileSystem, FileType,
            IndexNode, Metadata, ModeType, PollStatus,
        },
    },
    libs::spinlock::{SpinLock, SpinLockGuard},
    mm::VirtAddr,
    syscall::user_access::{UserBufferReader, UserBufferWriter},
    time::PosixTimeSpec,
};

/// 会话缓冲区的容量
pub const MEM_SIZE: usize = 1024;

/// 设备类的名称
const MEMCHAR_CLASS_NAME: &str = "memchar";

lazy_static! {
    /// 会话id分配器
    static ref MEMCHAR_SESSION_IDA: SpinLock<IdAllocator> =
        SpinLock::new(match IdAllocator::new(0, usize::MAX) {
            Some(ida) => ida,
            None => panic!("initial id must be less than max id"),
        });
}

/// 内存字符设备每次打开所持有的会话数据。
///
/// 每个会话独占自己的缓冲区，不同会话之间不共享任何可变状态。
#[derive(Debug)]
pub struct MemCharFilePrivateData {
    /// 本次会话独占的缓冲区
    buffer: Vec<u8>,
    /// 会话id，用于跟踪日志
    session_id: usize,
}

/// 内存字符设备：向用户空间暴露一块固定大小的内存缓冲区
#[derive(Debug)]
pub struct MemCharDevice {
    inner: SpinLock<InnerMemCharDevice>,
}

#[derive(Debug)]
struct InnerMemCharDevice {
    /// 指向自身的弱引用
    self_ref: Weak<MemCharDevice>,
    /// 指向inode所在的文件系统对象的指针
    fs: Weak<DevFS>,
    /// INode 元数据
    metadata: Metadata,
}

impl MemCharDevice {
    pub const NAME: &'static str = "memchar";

    pub fn new(devnum: DeviceNumber) -> Arc<Self> {
        let device = Arc::new(MemCharDevice {
            inner: SpinLock::new(InnerMemCharDevice {
                self_ref: Weak::default(),
                fs: Weak::default(),
                metadata: Metadata {
                    dev_id: 1,
                    inode_id: generate_inode_id(),
                    size: MEM_SIZE as i64,
                    blk_size: 0,
                    blocks: 0,
                    atime: PosixTimeSpec::default(),
                    mtime: PosixTimeSpec::default(),
                    ctime: PosixTimeSpec::default(),
                    file_type: FileType::CharDevice,
                    mode: ModeType::from_bits_truncate(0o666),
                    nlinks: 1,
                    uid: 0,
                    gid: 0,
                    raw_dev: devnum,
                },
            }),
        });
        device.inner.lock().self_ref = Arc::downgrade(&device);
        return device;
    }
}

impl DeviceINode for MemCharDevice {
    fn set_fs(&self, fs: Weak<DevFS>) {
        self.inner.lock().fs = fs;
    }
}

impl CharDevice for MemCharDevice {
    fn id_table(&self) -> IdTable {
        return IdTable::new(
            Self::NAME.to_string(),
            Some(self.inner.lock().metadata.raw_dev),
        );
    }

    fn inode(&self) -> Arc<dyn IndexNode> {
        return self.inner.lock().self_ref.upgrade().unwrap();
    }
}

impl IndexNode for MemCharDevice {
    fn as_any_ref(&self) -> &dyn core::any::Any {
        self
    }

    /// @brief 打开设备，为本次会话创建缓冲区
    ///
    /// ## 错误
    ///
    /// - `ENOMEM`：无法为会话缓冲区分配内存。此时会话不会建立，
    ///   后续的读写也不会被分发过来
    fn open(
        &self,
        mut data: SpinLockGuard<FilePrivateData>,
        _mode: &FileMode,
    ) -> Result<(), SystemError> {
        let mut buffer: Vec<u8> = Vec::new();
        buffer.try_reserve_exact(MEM_SIZE).map_err(|_| {
            error!("memchar: cannot allocate memory for the session buffer");
            SystemError::ENOMEM
        })?;
        buffer.resize(MEM_SIZE, 0);

        let session_id = MEMCHAR_SESSION_IDA
            .lock()
            .alloc()
            .ok_or(SystemError::ENOMEM)?;
        *data = FilePrivateData::MemChar(MemCharFilePrivateData { buffer, session_id });

        info!("memchar: device file opened, session {}", session_id);
        return Ok(());
    }

    /// @brief 关闭设备，释放本次会话的缓冲区。释放总是成功
    fn close(&self, mut data: SpinLockGuard<FilePrivateData>) -> Result<(), SystemError> {
        if let FilePrivateData::MemChar(session) =
            core::mem::replace(&mut *data, FilePrivateData::Unused)
        {
            MEMCHAR_SESSION_IDA.lock().free(session.session_id);
            info!("memchar: device file closed, session {}", session.session_id);
        }
        return Ok(());
    }

    /// @brief 读设备：把整个会话缓冲区拷贝到调用方提供的目标区域
    ///
    /// 这是整块传输契约：无论调用方请求多少字节，总是传出全部`MEM_SIZE`
    /// 字节，返回值恒为`MEM_SIZE`。因此目标区域的可访问性按`MEM_SIZE`
    /// 校验，而不是按`len`校验。
    ///
    /// ## 错误
    ///
    /// - `EBADF`：会话尚未通过open建立
    /// - `EFAULT`：目标区域无法容纳整块传输
    fn read_at(
        &self,
        _offset: usize,
        len: usize,
        buf: VirtAddr,
        data: SpinLockGuard<FilePrivateData>,
    ) -> Result<usize, SystemError> {
        let session = match &*data {
            FilePrivateData::MemChar(session) => session,
            _ => return Err(SystemError::EBADF),
        };

        let mut user_writer =
            UserBufferWriter::new(buf.data() as *mut u8, MEM_SIZE, true).map_err(|e| {
                error!(
                    "memchar: session {} error in copy to user",
                    session.session_id
                );
                e
            })?;
        user_writer.copy_to_user(&session.buffer, 0)?;

        debug!(
            "memchar: session {} data read done, {} bytes (requested {})",
            session.session_id, MEM_SIZE, len
        );
        return Ok(MEM_SIZE);
    }

    /// @brief 写设备：从调用方提供的源区域拷贝`len`字节到会话缓冲区
    ///
    /// 写入长度受缓冲区容量约束；超出容量的请求在任何拷贝发生之前失败，
    /// 缓冲区内容保持不变。
    ///
    /// ## 错误
    ///
    /// - `EBADF`：会话尚未通过open建立
    /// - `EFBIG`：写入长度超过缓冲区容量
    /// - `EFAULT`：源区域不可访问
    fn write_at(
        &self,
        _offset: usize,
        len: usize,
        buf: VirtAddr,
        mut data: SpinLockGuard<FilePrivateData>,
    ) -> Result<usize, SystemError> {
        let session = match &mut *data {
            FilePrivateData::MemChar(session) => session,
            _ => return Err(SystemError::EBADF),
        };

        if len > MEM_SIZE {
            error!(
                "memchar: session {} write of {} bytes exceeds the {} byte buffer",
                session.session_id, len, MEM_SIZE
            );
            return Err(SystemError::EFBIG);
        }

        let user_reader =
            UserBufferReader::new(buf.data() as *const u8, len, true).map_err(|e| {
                error!(
                    "memchar: session {} error in copy from user",
                    session.session_id
                );
                e
            })?;
        user_reader.copy_from_user(&mut session.buffer[..len], 0)?;

        debug!(
            "memchar: session {} data written, {} bytes",
            session.session_id, len
        );
        return Ok(len);
    }

    fn metadata(&self) -> Result<Metadata, SystemError> {
        return Ok(self.inner.lock().metadata.clone());
    }

    fn set_metadata(&self, metadata: &Metadata) -> Result<(), SystemError> {
        let mut inner = self.inner.lock();
        inner.metadata.atime = metadata.atime;
        inner.metadata.mtime = metadata.mtime;
        inner.metadata.ctime = metadata.ctime;
        inner.metadata.mode = metadata.mode;
        inner.metadata.uid = metadata.uid;
        inner.metadata.gid = metadata.gid;

        return Ok(());
    }

    fn poll(&self) -> Result<PollStatus, SystemError> {
        return Ok(PollStatus::READ | PollStatus::WRITE);
    }

    fn fs(&self) -> Arc<dyn FileSystem> {
        return self.inner.lock().fs.upgrade().unwrap();
    }
}

/// 驱动的注册记录。持有注册期间获取的全部资源，卸载时逆序释放
#[derive(Debug)]
struct MemCharRegistration {
    devnum: DeviceNumber,
    class: Arc<DeviceClass>,
    #[allow(dead_code)]
    device: Arc<MemCharDevice>,
}

static MEMCHAR_REGISTRATION: SpinLock<Option<MemCharRegistration>> = SpinLock::new(None);

/// @brief 注册内存字符设备驱动
///
/// 依次完成：分配设备号 -> 挂入字符设备表 -> 创建设备类 -> 创建设备节点。
/// 任何一步失败，都会把此前已经获取的资源按相反的顺序全部释放；
/// 设备文件只有在所有步骤都成功之后才对用户空间可见。
pub fn memchar_driver_init() -> Result<(), SystemError> {
    let mut registration = MEMCHAR_REGISTRATION.lock();
    if registration.is_some() {
        return Err(SystemError::EBUSY);
    }

    // armed在注册完成之前保持为true，期间任何一次提前返回都会触发回滚
    let armed = Cell::new(true);

    let devnum = alloc_chrdev_region(0, 1, MemCharDevice::NAME).map_err(|e| {
        error!("memchar: cannot allocate the device number");
        e
    })?;
    defer!({
        if armed.get() {
            unregister_chrdev_region(devnum, 1).ok();
        }
    });

    info!(
        "memchar: major num: {} minor num: {}",
        devnum.major().data(),
        devnum.minor()
    );

    let device = MemCharDevice::new(devnum);
    cdev_add(device.clone(), devnum, 1).map_err(|e| {
        error!("memchar: cannot add the device to the system");
        e
    })?;
    defer!({
        if armed.get() {
            cdev_del(devnum, 1);
        }
    });

    let class = class_create(MEMCHAR_CLASS_NAME).map_err(|e| {
        error!("memchar: cannot create the device class");
        e
    })?;
    defer!({
        if armed.get() {
            class_destroy(MEMCHAR_CLASS_NAME).ok();
        }
    });

    class
        .device_create(devnum, &device.id_table().name(), device.clone())
        .map_err(|e| {
            error!("memchar: cannot create the device node");
            e
        })?;

    armed.set(false);
    *registration = Some(MemCharRegistration {
        devnum,
        class,
        device,
    });
    info!("memchar: device driver is registered");
    return Ok(());
}

/// @brief 注销内存字符设备驱动，按注册时的相反顺序释放资源
///
/// 模块卸载至多发生一次；重复调用是无害的空操作。
pub fn memchar_driver_exit() -> Result<(), SystemError> {
    let registration = MEMCHAR_REGISTRATION.lock().take();
    let Some(registration) = registration else {
        return Ok(());
    };

    registration.class.device_destroy(registration.devnum)?;
    class_destroy(MEMCHAR_CLASS_NAME)?;
    cdev_del(registration.devnum, 1);
    unregister_chrdev_region(registration.devnum, 1)?;

    info!("memchar: character driver is removed");
    return Ok(());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::base::char::alloc_chrdev_region;
    use crate::driver::base::class::class_find;
    use crate::driver::base::device::device_number::mkdev;
    use crate::filesystem::devfs::{devfs_find, devfs_init};
    use crate::syscall::Syscall;
    use crate::test_support;

    const DEV_PATH: &str = "/dev/memchar";

    fn session_count() -> usize {
        return MEMCHAR_SESSION_IDA.lock().used();
    }

    /// 串行化并把驱动恢复到未注册状态，然后完成一次注册
    fn setup() -> std::sync::MutexGuard<'static, ()> {
        let guard = test_support::lock();
        devfs_init().unwrap();
        memchar_driver_exit().unwrap();
        memchar_driver_init().unwrap();
        return guard;
    }

    #[test]
    fn test_session_buffer_lifecycle() {
        let _guard = setup();

        let before = session_count();
        let file = Syscall::open(DEV_PATH, FileMode::O_RDWR).unwrap();
        assert_eq!(session_count(), before + 1);
        assert_eq!(file.mode(), FileMode::O_RDWR);
        assert_eq!(
            file.inode().metadata().unwrap().file_type,
            FileType::CharDevice
        );

        // 显式关闭之后，再次关闭和析构都不会重复释放
        file.close().unwrap();
        file.close().unwrap();
        assert_eq!(session_count(), before);
        drop(file);
        assert_eq!(session_count(), before);

        memchar_driver_exit().unwrap();
    }

    #[test]
    fn test_write_then_read_prefix_consistency() {
        let _guard = setup();

        let file = Syscall::open(DEV_PATH, FileMode::O_RDWR).unwrap();

        let msg = b"hello device";
        assert_eq!(
            Syscall::write(&file, msg.as_ptr(), msg.len()),
            Ok(msg.len())
        );

        let mut read_buf = [0u8; MEM_SIZE];
        assert_eq!(
            Syscall::read(&file, read_buf.as_mut_ptr(), read_buf.len()),
            Ok(MEM_SIZE)
        );
        assert_eq!(&read_buf[..msg.len()], msg);
        // 新开的会话缓冲区内容为全零，未写过的部分读出来也是零
        assert!(read_buf[msg.len()..].iter().all(|&b| b == 0));

        Syscall::close(file).unwrap();
        memchar_driver_exit().unwrap();
    }

    #[test]
    fn test_read_always_transfers_whole_buffer() {
        let _guard = setup();

        let file = Syscall::open(DEV_PATH, FileMode::O_RDWR).unwrap();
        let mut read_buf = [0u8; 2 * MEM_SIZE];

        // 无论请求0、10还是10000字节，传输的都是整个缓冲区
        for requested in [0usize, 10, 10000] {
            assert_eq!(
                Syscall::read(&file, read_buf.as_mut_ptr(), requested),
                Ok(MEM_SIZE)
            );
        }

        Syscall::close(file).unwrap();
        memchar_driver_exit().unwrap();
    }

    #[test]
    fn test_write_over_capacity_fails() {
        let _guard = setup();

        let file = Syscall::open(DEV_PATH, FileMode::O_RDWR).unwrap();

        let oversized = [0xaau8; 2 * MEM_SIZE];
        assert_eq!(
            Syscall::write(&file, oversized.as_ptr(), oversized.len()).err(),
            Some(SystemError::EFBIG)
        );

        // 失败的写入不会修改缓冲区
        let mut read_buf = [0xffu8; MEM_SIZE];
        assert_eq!(
            Syscall::read(&file, read_buf.as_mut_ptr(), read_buf.len()),
            Ok(MEM_SIZE)
        );
        assert!(read_buf.iter().all(|&b| b == 0));

        Syscall::close(file).unwrap();
        memchar_driver_exit().unwrap();
    }

    #[test]
    fn test_copy_failure_keeps_session_alive() {
        let _guard = setup();

        let file = Syscall::open(DEV_PATH, FileMode::O_RDWR).unwrap();

        // 目标区域不可访问，本次调用失败
        assert_eq!(
            Syscall::read(&file, core::ptr::null_mut(), MEM_SIZE).err(),
            Some(SystemError::EFAULT)
        );
        assert_eq!(
            Syscall::write(&file, core::ptr::null(), 16).err(),
            Some(SystemError::EFAULT)
        );

        // 会话与缓冲区仍然有效
        let msg = b"still alive";
        assert_eq!(
            Syscall::write(&file, msg.as_ptr(), msg.len()),
            Ok(msg.len())
        );
        let mut read_buf = [0u8; MEM_SIZE];
        assert_eq!(
            Syscall::read(&file, read_buf.as_mut_ptr(), read_buf.len()),
            Ok(MEM_SIZE)
        );
        assert_eq!(&read_buf[..msg.len()], msg);

        Syscall::close(file).unwrap();
        memchar_driver_exit().unwrap();
    }

    #[test]
    fn test_device_identity() {
        let device = MemCharDevice::new(mkdev(400, 0));
        assert_eq!(device.id_table().name(), MemCharDevice::NAME);
        assert_eq!(device.id_table().device_number(), mkdev(400, 0));
        // CharDevice的inode形态就是设备自身
        assert_eq!(
            device.inode().metadata().unwrap().raw_dev,
            mkdev(400, 0)
        );

        // 设备号以外的元数据可以更新
        let mut metadata = device.metadata().unwrap();
        metadata.mode = ModeType::from_bits_truncate(0o600);
        device.set_metadata(&metadata).unwrap();
        assert_eq!(
            device.metadata().unwrap().mode,
            ModeType::from_bits_truncate(0o600)
        );
    }

    #[test]
    fn test_unopened_session_is_rejected() {
        let _guard = test_support::lock();

        let device = MemCharDevice::new(mkdev(400, 0));
        let private_data = SpinLock::new(FilePrivateData::Unused);
        let mut buf = [0u8; MEM_SIZE];

        assert_eq!(
            device
                .read_at(
                    0,
                    MEM_SIZE,
                    VirtAddr::new(buf.as_mut_ptr() as usize),
                    private_data.lock()
                )
                .err(),
            Some(SystemError::EBADF)
        );
        assert_eq!(
            device
                .write_at(
                    0,
                    16,
                    VirtAddr::new(buf.as_ptr() as usize),
                    private_data.lock()
                )
                .err(),
            Some(SystemError::EBADF)
        );
    }

    #[test]
    fn test_sessions_have_independent_buffers() {
        let _guard = setup();

        let first = Syscall::open(DEV_PATH, FileMode::O_RDWR).unwrap();
        let second = Syscall::open(DEV_PATH, FileMode::O_RDWR).unwrap();

        let a = [0x11u8; 64];
        let b = [0x22u8; 64];
        Syscall::write(&first, a.as_ptr(), a.len()).unwrap();
        Syscall::write(&second, b.as_ptr(), b.len()).unwrap();

        let mut read_buf = [0u8; MEM_SIZE];
        Syscall::read(&first, read_buf.as_mut_ptr(), read_buf.len()).unwrap();
        assert_eq!(&read_buf[..64], &a);
        Syscall::read(&second, read_buf.as_mut_ptr(), read_buf.len()).unwrap();
        assert_eq!(&read_buf[..64], &b);

        Syscall::close(first).unwrap();
        Syscall::close(second).unwrap();
        memchar_driver_exit().unwrap();
    }

    #[test]
    fn test_concurrent_sessions_do_not_contaminate() {
        let _guard = setup();

        let mut handles = std::vec::Vec::new();
        for pattern in [0x33u8, 0x44, 0x55, 0x66] {
            handles.push(std::thread::spawn(move || {
                let file = Syscall::open(DEV_PATH, FileMode::O_RDWR).unwrap();
                let src = [pattern; MEM_SIZE];
                for _ in 0..32 {
                    Syscall::write(&file, src.as_ptr(), src.len()).unwrap();
                    let mut dst = [0u8; MEM_SIZE];
                    Syscall::read(&file, dst.as_mut_ptr(), dst.len()).unwrap();
                    assert!(dst.iter().all(|&b| b == pattern));
                }
                Syscall::close(file).unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        memchar_driver_exit().unwrap();
    }

    #[test]
    fn test_registration_failure_leaves_nothing_behind() {
        let _guard = test_support::lock();
        devfs_init().unwrap();
        memchar_driver_exit().unwrap();

        // 占满动态设备号空间，模拟设备号耗尽
        let mut occupied = std::vec::Vec::new();
        while let Ok(dev) = alloc_chrdev_region(0, 1, "hog") {
            occupied.push(dev);
        }

        assert_eq!(memchar_driver_init().err(), Some(SystemError::EBUSY));
        assert!(class_find(MEMCHAR_CLASS_NAME).is_none());
        assert_eq!(
            devfs_find(MemCharDevice::NAME).err(),
            Some(SystemError::ENOENT)
        );

        for dev in occupied {
            unregister_chrdev_region(dev, 1).unwrap();
        }
    }

    #[test]
    fn test_partial_registration_is_unwound() {
        let _guard = test_support::lock();
        devfs_init().unwrap();
        memchar_driver_exit().unwrap();

        // 预先占用类名，注册会在创建类的步骤失败
        let _class = class_create(MEMCHAR_CLASS_NAME).unwrap();
        assert_eq!(memchar_driver_init().err(), Some(SystemError::EEXIST));
        assert_eq!(
            devfs_find(MemCharDevice::NAME).err(),
            Some(SystemError::ENOENT)
        );
        class_destroy(MEMCHAR_CLASS_NAME).unwrap();

        // 失败时设备号和回调表都已经回滚，重新注册可以成功
        memchar_driver_init().unwrap();
        let file = Syscall::open(DEV_PATH, FileMode::O_RDWR).unwrap();
        Syscall::close(file).unwrap();
        memchar_driver_exit().unwrap();
    }

    #[test]
    fn test_unload_makes_device_unreachable() {
        let _guard = setup();

        let file = Syscall::open(DEV_PATH, FileMode::O_RDWR).unwrap();
        Syscall::close(file).unwrap();

        memchar_driver_exit().unwrap();
        assert_eq!(
            Syscall::open(DEV_PATH, FileMode::O_RDWR).err(),
            Some(SystemError::ENOENT)
        );
        // 重复卸载是无害的
        memchar_driver_exit().unwrap();

        // 重新注册后设备再次可达
        memchar_driver_init().unwrap();
        let file = Syscall::open(DEV_PATH, FileMode::O_RDWR).unwrap();
        Syscall::close(file).unwrap();
        memchar_driver_exit().unwrap();
    }

    #[test]
    fn test_class_is_busy_while_node_exists() {
        let _guard = setup();

        assert_eq!(
            class_destroy(MEMCHAR_CLASS_NAME).err(),
            Some(SystemError::EBUSY)
        );

        memchar_driver_exit().unwrap();
        assert!(class_find(MEMCHAR_CLASS_NAME).is_none());
    }

    #[test]
    fn test_device_node_metadata() {
        let _guard = setup();

        let node = devfs_find(MemCharDevice::NAME).unwrap();
        let metadata = node.metadata().unwrap();
        assert_eq!(metadata.file_type, FileType::CharDevice);
        assert_eq!(metadata.size, MEM_SIZE as i64);
        assert_ne!(metadata.raw_dev.data(), 0);

        // devfs中的节点就是设备本身，并且随时可读可写
        assert!(node.as_any_ref().is::<MemCharDevice>());
        assert_eq!(node.poll().unwrap(), PollStatus::READ | PollStatus::WRITE);

        memchar_driver_exit().unwrap();
    }
}
