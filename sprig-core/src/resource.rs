//! 资源加载
//!
//! 定义读取器通过 [`ResourceLoader`] 把位置字符串解析为可读取的 [`Resource`]。

use std::fmt;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{ContainerError, ContainerResult};

/// 可读取的资源
pub trait Resource: Send + Sync + fmt::Debug {
    /// 资源位置（用于日志和错误信息）
    fn location(&self) -> &str;

    /// 打开一个新的字节流
    fn input_stream(&self) -> ContainerResult<Box<dyn Read>>;

    /// 以 UTF-8 文本读取全部内容
    fn read_to_string(&self) -> ContainerResult<String> {
        let mut content = String::new();
        self.input_stream()?
            .read_to_string(&mut content)
            .map_err(|source| ContainerError::ResourceUnavailable {
                location: self.location().to_string(),
                source,
            })?;
        Ok(content)
    }
}

/// 文件系统资源
#[derive(Debug, Clone)]
pub struct FileResource {
    location: String,
    path: PathBuf,
}

impl FileResource {
    pub fn new(location: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Resource for FileResource {
    fn location(&self) -> &str {
        &self.location
    }

    fn input_stream(&self) -> ContainerResult<Box<dyn Read>> {
        let file = File::open(&self.path).map_err(|source| ContainerError::ResourceUnavailable {
            location: self.location.clone(),
            source,
        })?;
        Ok(Box::new(file))
    }
}

/// 内存资源
#[derive(Clone)]
pub struct ByteArrayResource {
    location: String,
    bytes: Arc<[u8]>,
}

impl ByteArrayResource {
    pub fn new(location: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        Self {
            location: location.into(),
            bytes: Arc::from(bytes),
        }
    }
}

impl fmt::Debug for ByteArrayResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteArrayResource")
            .field("location", &self.location)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Resource for ByteArrayResource {
    fn location(&self) -> &str {
        &self.location
    }

    fn input_stream(&self) -> ContainerResult<Box<dyn Read>> {
        Ok(Box::new(Cursor::new(Arc::clone(&self.bytes))))
    }
}

/// 资源加载器
///
/// 支持普通路径、`file:` 前缀，以及相对于基础目录的相对路径。
#[derive(Debug, Clone, Default)]
pub struct ResourceLoader {
    base_dir: Option<PathBuf>,
}

impl ResourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// 相对路径基于 `base_dir` 解析
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    /// 获取资源；资源是否存在在读取时才检查
    pub fn get_resource(&self, location: &str) -> Box<dyn Resource> {
        let path = self.resolve(location);
        tracing::trace!("Resolved resource '{}' to {}", location, path.display());
        Box::new(FileResource::new(location, path))
    }

    fn resolve(&self, location: &str) -> PathBuf {
        let path = Path::new(location.strip_prefix("file:").unwrap_or(location));
        match &self.base_dir {
            Some(base_dir) if path.is_relative() => base_dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}
