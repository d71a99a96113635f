use alloc::{sync::Arc, vec::Vec};
use core::cmp::Ordering;
use log::error;
use system_error::SystemError;

use super::device::device_number::{mkdev, DeviceNumber};
use super::device::IdTable;
use super::map::{kobj_lookup, kobj_map, kobj_unmap, LockKObjMap};
use crate::filesystem::vfs::IndexNode;
use crate::libs::spinlock::SpinLock;

const CHRDEV_MAJOR_HASH_SIZE: usize = 255;
const CHRDEV_MAJOR_MAX: u32 = 512;
/* Marks the bottom of the first segment of free char majors */
const CHRDEV_MAJOR_DYN_END: usize = 234;
/* Marks the top and bottom of the second segment of free char majors */
const CHRDEV_MAJOR_DYN_EXT_START: usize = 511;
const CHRDEV_MAJOR_DYN_EXT_END: usize = 384;

lazy_static! {
    // 全局字符设备号管理实例
    pub static ref CHRDEVS: Arc<LockChrDevs> = Arc::new(LockChrDevs::default());

    // 全局字符设备管理实例
    pub static ref CDEVMAP: Arc<LockKObjMap> = Arc::new(LockKObjMap::default());
}

/// 字符设备应当实现的操作。
///
/// 设备注册时，这个trait对象被当作回调表挂入全局字符设备表；
/// 之后用户对设备文件的open/read/write/close都经由它分发到具体设备。
pub trait CharDevice: IndexNode {
    /// @brief: 获取设备标识
    fn id_table(&self) -> IdTable;

    /// @brief: 获取该设备的inode形态，供文件层打开设备使用
    fn inode(&self) -> Arc<dyn IndexNode>;
}

// 管理字符设备号的map(加锁)
pub struct LockChrDevs(SpinLock<ChrDevs>);

impl Default for LockChrDevs {
    fn default() -> Self {
        LockChrDevs(SpinLock::new(ChrDevs::default()))
    }
}

// 管理字符设备号的map
struct ChrDevs(Vec<Vec<CharDeviceStruct>>);

impl Default for ChrDevs {
    fn default() -> Self {
        ChrDevs(vec![Vec::new(); CHRDEV_MAJOR_HASH_SIZE])
    }
}

// 字符设备号区间在系统中的记录，一条记录对应一次设备号分配
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct CharDeviceStruct {
    dev_t: DeviceNumber, //起始设备号
    minorct: usize,      // 次设备号数量
    name: &'static str,  //字符设备名
}

impl CharDeviceStruct {
    /// @brief: 创建实例
    /// @parameter: dev_t: 设备号
    ///             minorct: 次设备号数量
    ///             name: 字符设备名
    /// @return: 实例
    pub fn new(dev_t: DeviceNumber, minorct: usize, name: &'static str) -> Self {
        Self {
            dev_t,
            minorct,
            name,
        }
    }

    /// @brief: 获取起始设备号
    pub fn device_number(&self) -> DeviceNumber {
        self.dev_t
    }

    /// @brief: 获取起始次设备号
    pub fn base_minor(&self) -> u32 {
        self.dev_t.minor()
    }

    /// @brief: 获取次设备号数量
    pub fn minorct(&self) -> usize {
        self.minorct
    }
}

/// @brief: 主设备号转下标
/// @parameter: major: 主设备号
/// @return: 返回下标
fn major_to_index(major: u32) -> usize {
    return major as usize % CHRDEV_MAJOR_HASH_SIZE;
}

/// @brief: 动态获取主设备号
/// @parameter: chrdevs: 已加锁的设备号管理map
/// @return: 如果成功，返回主设备号，否则，返回错误码
fn find_dynamic_major(chrdevs: &ChrDevs) -> Result<u32, SystemError> {
    // 寻找主设备号为234～254的设备
    for index in (CHRDEV_MAJOR_DYN_END..CHRDEV_MAJOR_HASH_SIZE).rev() {
        if let Some(item) = chrdevs.0.get(index) {
            if item.is_empty() {
                return Ok(index as u32); // 返回可用的主设备号
            }
        }
    }
    // 寻找主设备号在385～511的设备
    for index in (CHRDEV_MAJOR_DYN_EXT_END + 1..CHRDEV_MAJOR_DYN_EXT_START + 1).rev() {
        if let Some(bucket) = chrdevs.0.get(major_to_index(index as u32)) {
            // 如果数组中不存在主设备号等于index的设备，则该主设备号可用
            if !bucket
                .iter()
                .any(|item| item.device_number().major().data() == index as u32)
            {
                return Ok(index as u32);
            }
        }
    }
    return Err(SystemError::EBUSY);
}

/// @brief: 注册设备号，该函数需要指定主设备号
/// @parameter: from: 起始设备号
///             count: 次设备号数量
///             name: 字符设备名
/// @return: 如果注册成功，返回设备号，否则，返回错误码
pub fn register_chrdev_region(
    from: DeviceNumber,
    count: usize,
    name: &'static str,
) -> Result<DeviceNumber, SystemError> {
    __register_chrdev_region(from, count, name)
}

/// @brief: 注册设备号，该函数自动分配主设备号
/// @parameter: baseminor: 起始次设备号
///             count: 次设备号数量
///             name: 字符设备名
/// @return: 如果注册成功，返回设备号，否则，返回错误码
pub fn alloc_chrdev_region(
    baseminor: u32,
    count: usize,
    name: &'static str,
) -> Result<DeviceNumber, SystemError> {
    __register_chrdev_region(mkdev(0, baseminor), count, name)
}

/// @brief: 注册设备号
/// @parameter: device_number: 设备号，主设备号如果为0，则动态分配
///             minorct: 次设备号数量
///             name: 字符设备名
/// @return: 如果注册成功，返回设备号，否则，返回错误码
fn __register_chrdev_region(
    device_number: DeviceNumber,
    minorct: usize,
    name: &'static str,
) -> Result<DeviceNumber, SystemError> {
    let mut major = device_number.major().data();
    let baseminor = device_number.minor();
    if major >= CHRDEV_MAJOR_MAX {
        error!(
            "CHRDEV {} major requested {} is greater than the maximum {}",
            name,
            major,
            CHRDEV_MAJOR_MAX - 1
        );
        return Err(SystemError::EINVAL);
    }
    if minorct as u32 > DeviceNumber::MINOR_MASK + 1 - baseminor {
        error!("CHRDEV {} minor range requested ({}-{}) is out of range of maximum range ({}-{}) for a single major",
            name, baseminor, baseminor as usize + minorct - 1, 0, DeviceNumber::MINOR_MASK);
        return Err(SystemError::EINVAL);
    }

    let mut chrdevs = CHRDEVS.0.lock();
    if major == 0 {
        // 如果主设备号为0,则自动分配主设备号
        major = find_dynamic_major(&chrdevs)?;
    }

    let chrdev = CharDeviceStruct::new(mkdev(major, baseminor), minorct, name);
    let bucket = &mut chrdevs.0[major_to_index(major)];
    // 桶内记录按(major, baseminor)有序存放
    let mut insert_index = bucket.len();
    for (index, item) in bucket.iter().enumerate() {
        match item.device_number().major().data().cmp(&major) {
            Ordering::Less => continue,
            Ordering::Greater => {
                insert_index = index;
                break; // 大于则向前插入
            }
            Ordering::Equal => {
                if item.base_minor() as usize + item.minorct() <= baseminor as usize {
                    continue; // 已有区间整体在被插入区间之前
                }
                if item.base_minor() as usize >= baseminor as usize + minorct {
                    insert_index = index;
                    break; // 在此处插入
                }
                return Err(SystemError::EBUSY); // 存在重合的次设备号
            }
        }
    }
    bucket.insert(insert_index, chrdev);
    return Ok(mkdev(major, baseminor));
}

/// @brief: 注销设备号
/// @parameter: device_number: 起始设备号
///             minorct: 次设备号数量
/// @return: 如果注销成功，返回()，否则，返回错误码
pub fn unregister_chrdev_region(
    device_number: DeviceNumber,
    minorct: usize,
) -> Result<(), SystemError> {
    if let Some(items) = CHRDEVS
        .0
        .lock()
        .0
        .get_mut(major_to_index(device_number.major().data()))
    {
        for (index, item) in items.iter().enumerate() {
            if item.device_number() == device_number && item.minorct() == minorct {
                // 设备号和数量都相等
                items.remove(index);
                return Ok(());
            }
        }
    }
    return Err(SystemError::EBUSY);
}

/// @brief: 字符设备注册。将设备的回调表挂入全局字符设备表
/// @parameter: cdev: 字符设备实例
///             dev_t: 起始设备号
///             range: 次设备号范围
/// @return: 如果注册成功，返回()，否则，返回错误码
pub fn cdev_add(
    cdev: Arc<dyn CharDevice>,
    dev_t: DeviceNumber,
    range: usize,
) -> Result<(), SystemError> {
    if dev_t.data() == 0 {
        error!("Device number can't be 0!");
        return Err(SystemError::EINVAL);
    }
    return kobj_map(CDEVMAP.clone(), dev_t, range, cdev);
}

/// @brief: 字符设备注销。移除设备的回调表绑定
/// @parameter: dev_t: 起始设备号
///             range: 次设备号范围
pub fn cdev_del(dev_t: DeviceNumber, range: usize) {
    kobj_unmap(CDEVMAP.clone(), dev_t, range);
}

/// @brief: 根据设备号查找字符设备
///
/// ## 错误
///
/// - `ENXIO`：设备号没有绑定任何字符设备
pub fn cdev_get(dev_t: DeviceNumber) -> Result<Arc<dyn CharDevice>, SystemError> {
    return kobj_lookup(CDEVMAP.clone(), dev_t).ok_or(SystemError::ENXIO);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn test_register_region_overlap() {
        let _guard = test_support::lock();

        let dev = register_chrdev_region(mkdev(100, 0), 8, "overlap-a").unwrap();
        assert_eq!(dev, mkdev(100, 0));

        // 与已有区间部分重合
        assert_eq!(
            register_chrdev_region(mkdev(100, 4), 8, "overlap-b").err(),
            Some(SystemError::EBUSY)
        );
        // 紧邻的区间可以注册
        let next = register_chrdev_region(mkdev(100, 8), 8, "overlap-c").unwrap();

        unregister_chrdev_region(dev, 8).unwrap();
        unregister_chrdev_region(next, 8).unwrap();
        // 再次注销，应当失败
        assert_eq!(
            unregister_chrdev_region(dev, 8).err(),
            Some(SystemError::EBUSY)
        );
    }

    #[test]
    fn test_register_region_validation() {
        let _guard = test_support::lock();

        assert_eq!(
            register_chrdev_region(mkdev(CHRDEV_MAJOR_MAX, 0), 1, "bad-major").err(),
            Some(SystemError::EINVAL)
        );
        assert_eq!(
            register_chrdev_region(mkdev(101, DeviceNumber::MINOR_MASK), 2, "bad-range").err(),
            Some(SystemError::EINVAL)
        );
    }

    #[test]
    fn test_alloc_dynamic_major() {
        let _guard = test_support::lock();

        let dev = alloc_chrdev_region(0, 1, "dynamic-major").unwrap();
        let major = dev.major().data() as usize;
        assert!(
            (CHRDEV_MAJOR_DYN_END..CHRDEV_MAJOR_HASH_SIZE).contains(&major)
                || (CHRDEV_MAJOR_DYN_EXT_END + 1..=CHRDEV_MAJOR_DYN_EXT_START).contains(&major)
        );
        unregister_chrdev_region(dev, 1).unwrap();
    }

    #[test]
    fn test_dynamic_major_exhaustion() {
        let _guard = test_support::lock();

        // 把动态分配空间全部占满
        let mut allocated = std::vec::Vec::new();
        loop {
            match alloc_chrdev_region(0, 1, "exhaustion") {
                Ok(dev) => allocated.push(dev),
                Err(e) => {
                    assert_eq!(e, SystemError::EBUSY);
                    break;
                }
            }
        }
        assert!(!allocated.is_empty());

        // 释放后可以再次分配
        for dev in allocated {
            unregister_chrdev_region(dev, 1).unwrap();
        }
        let dev = alloc_chrdev_region(0, 1, "exhaustion").unwrap();
        unregister_chrdev_region(dev, 1).unwrap();
    }
}
