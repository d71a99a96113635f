pub mod device_number;

use alloc::string::String;

use self::device_number::DeviceNumber;

/// @brief: 设备标识符类型
#[derive(Debug, Clone, Hash, PartialOrd, PartialEq, Ord, Eq)]
pub struct IdTable {
    basename: String,
    id: Option<DeviceNumber>,
}

impl IdTable {
    /// @brief: 创建一个新的设备标识符
    /// @parameter: basename: 设备名
    ///             id: 设备号
    /// @return: 设备标识符
    pub fn new(basename: String, id: Option<DeviceNumber>) -> IdTable {
        return IdTable { basename, id };
    }

    /// @brief: 获取设备名
    pub fn name(&self) -> String {
        return self.basename.clone();
    }

    /// @brief: 获取设备号
    pub fn device_number(&self) -> DeviceNumber {
        return self.id.unwrap_or_default();
    }
}
