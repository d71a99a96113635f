use alloc::{collections::BTreeMap, string::String, sync::Arc};
use system_error::SystemError;

use super::device::device_number::DeviceNumber;
use crate::filesystem::devfs::{devfs_register, devfs_unregister, DeviceINode};
use crate::libs::spinlock::SpinLock;

lazy_static! {
    /// 全局设备类注册表
    static ref CLASSES: SpinLock<BTreeMap<&'static str, Arc<DeviceClass>>> =
        SpinLock::new(BTreeMap::new());
}

/// 设备类：一组同类设备的具名集合。
///
/// 设备节点隶属于某个类；节点的生命周期被夹在类的创建与销毁之间，
/// 因此节点永远不会在没有有效设备身份背书的情况下存在。
#[derive(Debug)]
pub struct DeviceClass {
    name: &'static str,
    /// 本类名下已创建的设备节点：设备号 -> 节点名
    devices: SpinLock<BTreeMap<DeviceNumber, String>>,
}

impl DeviceClass {
    fn new(name: &'static str) -> Arc<Self> {
        return Arc::new(Self {
            name,
            devices: SpinLock::new(BTreeMap::new()),
        });
    }

    /// @brief: 获取类名
    pub fn name(&self) -> &'static str {
        return self.name;
    }

    /// @brief: 在该类下创建设备节点。
    /// 节点创建成功后，设备即对用户空间可见（`/dev/<name>`）
    ///
    /// ## 错误
    ///
    /// - `EEXIST`：设备号在本类下已有节点，或同名节点已经存在
    pub fn device_create<T: DeviceINode>(
        &self,
        devnum: DeviceNumber,
        name: &str,
        device: Arc<T>,
    ) -> Result<(), SystemError> {
        let mut devices = self.devices.lock();
        if devices.contains_key(&devnum) {
            return Err(SystemError::EEXIST);
        }
        devfs_register(name, device)?;
        devices.insert(devnum, String::from(name));
        return Ok(());
    }

    /// @brief: 销毁该类下指定设备号的设备节点，设备随即对用户空间不可见
    ///
    /// ## 错误
    ///
    /// - `ENODEV`：本类下没有这个设备号对应的节点
    pub fn device_destroy(&self, devnum: DeviceNumber) -> Result<(), SystemError> {
        let name = self
            .devices
            .lock()
            .remove(&devnum)
            .ok_or(SystemError::ENODEV)?;
        return devfs_unregister(&name);
    }

    /// @brief: 本类名下的设备节点数量
    pub fn device_count(&self) -> usize {
        return self.devices.lock().len();
    }
}

/// @brief: 创建设备类
///
/// ## 错误
///
/// - `EEXIST`：同名的类已经存在
pub fn class_create(name: &'static str) -> Result<Arc<DeviceClass>, SystemError> {
    let mut classes = CLASSES.lock();
    if classes.contains_key(name) {
        return Err(SystemError::EEXIST);
    }
    let class = DeviceClass::new(name);
    classes.insert(name, class.clone());
    return Ok(class);
}

/// @brief: 销毁设备类
///
/// ## 错误
///
/// - `ENOENT`：不存在这样的类
/// - `EBUSY`：类名下还有设备节点，必须先销毁节点
pub fn class_destroy(name: &str) -> Result<(), SystemError> {
    let mut classes = CLASSES.lock();
    let class = classes.get(name).ok_or(SystemError::ENOENT)?;
    if class.device_count() > 0 {
        return Err(SystemError::EBUSY);
    }
    classes.remove(name);
    return Ok(());
}

/// @brief: 按名称查找设备类
pub fn class_find(name: &str) -> Option<Arc<DeviceClass>> {
    return CLASSES.lock().get(name).cloned();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn test_class_lifecycle() {
        let _guard = test_support::lock();

        let class = class_create("testclass0").unwrap();
        assert_eq!(class.name(), "testclass0");
        assert!(class_find("testclass0").is_some());

        // 同名的类不允许重复创建
        assert_eq!(
            class_create("testclass0").err(),
            Some(SystemError::EEXIST)
        );

        class_destroy("testclass0").unwrap();
        assert!(class_find("testclass0").is_none());
        assert_eq!(class_destroy("testclass0").err(), Some(SystemError::ENOENT));
    }
}
