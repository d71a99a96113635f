use alloc::{
    collections::BTreeMap,
    string::String,
    sync::{Arc, Weak},
    vec::Vec,
};
use log::info;
use system_error::SystemError;

use super::vfs::{
    core::generate_inode_id, FilePrivateData, FileSystem, FileType, FsInfo, IndexNode, Metadata,
    ModeType, PollStatus, MAX_NAMELEN,
};
use crate::libs::spinlock::{SpinLock, SpinLockGuard};
use crate::mm::VirtAddr;
use crate::time::PosixTimeSpec;

lazy_static! {
    /// devfs的全局实例
    static ref DEVFS_INSTANCE: Arc<DevFS> = DevFS::new();
}

/// @brief 初始化devfs
pub fn devfs_init() -> Result<(), SystemError> {
    lazy_static::initialize(&DEVFS_INSTANCE);
    info!("devfs initialized.");
    return Ok(());
}

/// devfs的设备inode需要实现的trait
pub trait DeviceINode: IndexNode {
    fn set_fs(&self, fs: Weak<DevFS>);
}

/// @brief 在devfs中注册设备节点，使设备对用户可见
///
/// ## 参数
///
/// - `name`：设备名称（即`/dev/`下的文件名）
/// - `device`：设备inode
///
/// ## 错误
///
/// - `ENAMETOOLONG`：设备名过长
/// - `EEXIST`：同名节点已经存在
pub fn devfs_register<T: DeviceINode>(name: &str, device: Arc<T>) -> Result<(), SystemError> {
    if name.len() > MAX_NAMELEN {
        return Err(SystemError::ENAMETOOLONG);
    }
    let devfs = DevFS::instance();
    devfs.root_inode.add_dev(name, device.clone())?;
    device.set_fs(Arc::downgrade(devfs));
    return Ok(());
}

/// @brief 把设备节点从devfs中移除，设备随即对用户不可见
///
/// ## 错误
///
/// - `ENOENT`：不存在这样的节点
pub fn devfs_unregister(name: &str) -> Result<(), SystemError> {
    return DevFS::instance().root_inode.remove(name);
}

/// @brief 在devfs中查找设备节点
pub fn devfs_find(name: &str) -> Result<Arc<dyn IndexNode>, SystemError> {
    return DevFS::instance().root_inode.find(name);
}

/// @brief dev文件系统
#[derive(Debug)]
pub struct DevFS {
    // 文件系统根节点
    root_inode: Arc<LockedDevFSInode>,
}

impl FileSystem for DevFS {
    fn as_any_ref(&self) -> &dyn core::any::Any {
        self
    }

    fn root_inode(&self) -> Arc<dyn IndexNode> {
        return self.root_inode.clone();
    }

    fn info(&self) -> FsInfo {
        return FsInfo {
            blk_dev_id: 0,
            max_name_len: MAX_NAMELEN,
        };
    }
}

impl DevFS {
    pub fn instance() -> &'static Arc<DevFS> {
        return &DEVFS_INSTANCE;
    }

    fn new() -> Arc<Self> {
        // 初始化root inode。/dev 的权限设置为 读+执行，root可以读写
        let root: Arc<LockedDevFSInode> = Arc::new(LockedDevFSInode(SpinLock::new(
            DevFSInode::new(FileType::Dir, ModeType::from_bits_truncate(0o755)),
        )));

        let result: Arc<DevFS> = Arc::new(DevFS { root_inode: root });

        // 对root inode加锁，并继续完成初始化工作
        let mut root_guard: SpinLockGuard<DevFSInode> = result.root_inode.0.lock();
        root_guard.parent = Arc::downgrade(&result.root_inode);
        root_guard.self_ref = Arc::downgrade(&result.root_inode);
        root_guard.fs = Arc::downgrade(&result);
        // 释放锁
        drop(root_guard);

        return result;
    }
}

/// @brief dev文件i节点(锁)
#[derive(Debug)]
pub struct LockedDevFSInode(SpinLock<DevFSInode>);

/// @brief dev文件i节点(无锁)
#[derive(Debug)]
pub struct DevFSInode {
    /// 指向父Inode的弱引用
    parent: Weak<LockedDevFSInode>,
    /// 指向自身的弱引用
    self_ref: Weak<LockedDevFSInode>,
    /// 子Inode的B树
    children: BTreeMap<String, Arc<dyn IndexNode>>,
    /// 指向inode所在的文件系统对象的指针
    fs: Weak<DevFS>,
    /// INode 元数据
    metadata: Metadata,
}

impl DevFSInode {
    pub fn new(file_type: FileType, mode: ModeType) -> Self {
        return DevFSInode {
            parent: Weak::default(),
            self_ref: Weak::default(),
            children: BTreeMap::new(),
            metadata: Metadata {
                dev_id: 0,
                inode_id: generate_inode_id(),
                size: 0,
                blk_size: 0,
                blocks: 0,
                atime: PosixTimeSpec::default(),
                mtime: PosixTimeSpec::default(),
                ctime: PosixTimeSpec::default(),
                file_type,
                mode,
                nlinks: 1,
                uid: 0,
                gid: 0,
                raw_dev: Default::default(),
            },
            fs: Weak::default(),
        };
    }
}

impl LockedDevFSInode {
    pub fn add_dev(&self, name: &str, dev: Arc<dyn IndexNode>) -> Result<(), SystemError> {
        let mut this = self.0.lock();

        if this.children.contains_key(name) {
            return Err(SystemError::EEXIST);
        }

        this.children.insert(String::from(name), dev);
        return Ok(());
    }

    pub fn remove(&self, name: &str) -> Result<(), SystemError> {
        self.0
            .lock()
            .children
            .remove(name)
            .ok_or(SystemError::ENOENT)?;
        return Ok(());
    }
}

impl IndexNode for LockedDevFSInode {
    fn as_any_ref(&self) -> &dyn core::any::Any {
        self
    }

    fn find(&self, name: &str) -> Result<Arc<dyn IndexNode>, SystemError> {
        let inode = self.0.lock();

        if inode.metadata.file_type != FileType::Dir {
            return Err(SystemError::ENOTDIR);
        }

        match name {
            "" | "." => {
                return Ok(inode.self_ref.upgrade().ok_or(SystemError::ENOENT)?);
            }

            ".." => {
                return Ok(inode.parent.upgrade().ok_or(SystemError::ENOENT)?);
            }
            name => {
                // 在子目录项中查找
                return Ok(inode.children.get(name).ok_or(SystemError::ENOENT)?.clone());
            }
        }
    }

    fn fs(&self) -> Arc<dyn FileSystem> {
        return self.0.lock().fs.upgrade().unwrap();
    }

    fn list(&self) -> Result<Vec<String>, SystemError> {
        let info = self.metadata()?;
        if info.file_type != FileType::Dir {
            return Err(SystemError::ENOTDIR);
        }

        let mut keys: Vec<String> = Vec::new();
        keys.push(String::from("."));
        keys.push(String::from(".."));
        keys.append(&mut self.0.lock().children.keys().cloned().collect());

        return Ok(keys);
    }

    fn metadata(&self) -> Result<Metadata, SystemError> {
        return Ok(self.0.lock().metadata.clone());
    }

    fn set_metadata(&self, metadata: &Metadata) -> Result<(), SystemError> {
        let mut inode = self.0.lock();
        inode.metadata.atime = metadata.atime;
        inode.metadata.mtime = metadata.mtime;
        inode.metadata.ctime = metadata.ctime;
        inode.metadata.mode = metadata.mode;
        inode.metadata.uid = metadata.uid;
        inode.metadata.gid = metadata.gid;

        return Ok(());
    }

    fn poll(&self) -> Result<PollStatus, SystemError> {
        // 加锁
        let inode: SpinLockGuard<DevFSInode> = self.0.lock();

        // 检查当前inode是否为一个文件夹，如果是的话，就返回错误
        if inode.metadata.file_type == FileType::Dir {
            return Err(SystemError::EISDIR);
        }

        return Ok(PollStatus::READ | PollStatus::WRITE);
    }

    /// 读设备 - 应该调用设备的函数读写，而不是通过文件系统读写
    fn read_at(
        &self,
        _offset: usize,
        _len: usize,
        _buf: VirtAddr,
        _data: SpinLockGuard<FilePrivateData>,
    ) -> Result<usize, SystemError> {
        return Err(SystemError::EISDIR);
    }

    /// 写设备 - 应该调用设备的函数读写，而不是通过文件系统读写
    fn write_at(
        &self,
        _offset: usize,
        _len: usize,
        _buf: VirtAddr,
        _data: SpinLockGuard<FilePrivateData>,
    ) -> Result<usize, SystemError> {
        return Err(SystemError::EISDIR);
    }
}
