use alloc::{collections::BTreeMap, sync::Arc};
use system_error::SystemError;

use super::char::CharDevice;
use super::device::device_number::DeviceNumber;
use crate::libs::spinlock::SpinLock;

/// 管理字符设备号到设备实例映射的map(加锁)
pub struct LockKObjMap(SpinLock<KObjMap>);

impl Default for LockKObjMap {
    fn default() -> Self {
        return LockKObjMap(SpinLock::new(KObjMap::default()));
    }
}

/// 管理字符设备号到设备实例的映射。
///
/// 每个条目覆盖从起始设备号开始的一段连续次设备号区间。
#[derive(Default)]
struct KObjMap(BTreeMap<DeviceNumber, Probe>);

struct Probe {
    /// 条目覆盖的次设备号数量
    range: usize,
    /// 设备实例
    dev: Arc<dyn CharDevice>,
}

/// @brief: 把一段设备号区间映射到设备实例
///
/// ## 错误
///
/// - `EBUSY`：区间与已有条目重合
pub fn kobj_map(
    map: Arc<LockKObjMap>,
    dev_t: DeviceNumber,
    range: usize,
    dev: Arc<dyn CharDevice>,
) -> Result<(), SystemError> {
    let mut guard = map.0.lock();
    let begin = dev_t.data();
    let end = begin + range as u32;
    for (base, probe) in guard.0.iter() {
        let probe_end = base.data() + probe.range as u32;
        if base.data() < end && begin < probe_end {
            return Err(SystemError::EBUSY);
        }
    }
    guard.0.insert(dev_t, Probe { range, dev });
    return Ok(());
}

/// @brief: 解除一段设备号区间的映射
pub fn kobj_unmap(map: Arc<LockKObjMap>, dev_t: DeviceNumber, range: usize) {
    let mut guard = map.0.lock();
    let matched = guard.0.get(&dev_t).map(|probe| probe.range) == Some(range);
    if matched {
        guard.0.remove(&dev_t);
    }
}

/// @brief: 查找覆盖了指定设备号的设备实例
pub fn kobj_lookup(map: Arc<LockKObjMap>, dev_t: DeviceNumber) -> Option<Arc<dyn CharDevice>> {
    let guard = map.0.lock();
    for (base, probe) in guard.0.iter() {
        if base.data() <= dev_t.data() && dev_t.data() < base.data() + probe.range as u32 {
            return Some(probe.dev.clone());
        }
    }
    return None;
}
