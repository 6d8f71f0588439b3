//! 配置类型相关的宏定义

/// 为「配置 -> 组件」实现 `TryFrom`
///
/// 用法：`impl_try_from!(ConfigType => Type, Error)`，内部调用 `Type::new(config)`，
/// 要求 `new` 返回 `Result<Type, Error>`
#[macro_export]
macro_rules! impl_try_from {
    ($config_type:ty => $target_type:ty, $error:ty) => {
        impl TryFrom<$config_type> for $target_type {
            type Error = $error;

            fn try_from(config: $config_type) -> Result<Self, Self::Error> {
                <$target_type>::new(config)
            }
        }
    };
}
