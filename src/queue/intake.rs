use tracing::warn;

use super::types::FileInput;

/// 文件接收原语 - 呈现层交给队列之前的筛选规则
///
/// 队列本身还有自己的大小上限（`QueueConfig::max_file_size_bytes`）；
/// 两处只应配置其中一个生效的值。
#[derive(Debug, Clone)]
pub struct FileIntake {
    /// MIME 过滤规则："*/*"、"image/*" 或完整类型
    pub accept: String,
    /// 是否允许一次接收多个文件
    pub multiple: bool,
    /// 单文件大小上限（字节）
    pub max_file_size_bytes: u64,
}

impl Default for FileIntake {
    fn default() -> Self {
        Self {
            accept: "*/*".to_string(),
            multiple: true,
            max_file_size_bytes: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// 被拒收的文件及原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedFile {
    pub name: String,
    pub size_bytes: u64,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// 超出大小限制
    Oversized,
    /// MIME 类型不匹配 accept 规则
    MimeMismatch,
    /// multiple=false 时的额外文件
    SingleOnly,
}

impl FileIntake {
    /// Screen raw inputs; returns the accepted ones and the rejects with reasons
    pub fn filter(&self, inputs: Vec<FileInput>) -> (Vec<FileInput>, Vec<RejectedFile>) {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();

        for input in inputs {
            let reason = if !self.multiple && !accepted.is_empty() {
                Some(RejectReason::SingleOnly)
            } else if !mime_matches(&self.accept, &input.mime_type) {
                Some(RejectReason::MimeMismatch)
            } else if input.size_bytes() > self.max_file_size_bytes {
                Some(RejectReason::Oversized)
            } else {
                None
            };

            match reason {
                None => accepted.push(input),
                Some(reason) => {
                    warn!(
                        name = %input.name,
                        size = input.size_bytes(),
                        ?reason,
                        "rejecting file at intake"
                    );
                    rejected.push(RejectedFile {
                        name: input.name,
                        size_bytes: input.content.len() as u64,
                        reason,
                    });
                }
            }
        }

        (accepted, rejected)
    }
}

/// "*/*"、"image/*" 或完整 MIME 的匹配
pub fn mime_matches(pattern: &str, mime_type: &str) -> bool {
    if pattern.is_empty() || pattern == "*/*" {
        return true;
    }

    match pattern.split_once('/') {
        Some((main, "*")) => mime_type.split('/').next() == Some(main),
        _ => pattern.eq_ignore_ascii_case(mime_type),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_matches() {
        assert!(mime_matches("*/*", "application/pdf"));
        assert!(mime_matches("", "text/plain"));
        assert!(mime_matches("image/*", "image/png"));
        assert!(mime_matches("image/png", "image/png"));
        assert!(mime_matches("image/PNG", "image/png"));

        assert!(!mime_matches("image/*", "text/plain"));
        assert!(!mime_matches("image/png", "image/jpeg"));
    }

    #[test]
    fn test_filter_oversized() {
        let intake = FileIntake {
            max_file_size_bytes: 4,
            ..Default::default()
        };

        let inputs = vec![
            FileInput::new("small.txt", "text/plain", vec![0u8; 4]),
            FileInput::new("big.txt", "text/plain", vec![0u8; 5]),
        ];

        let (accepted, rejected) = intake.filter(inputs);
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].name, "small.txt");
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].reason, RejectReason::Oversized);
    }

    #[test]
    fn test_filter_single_only() {
        let intake = FileIntake {
            multiple: false,
            ..Default::default()
        };

        let inputs = vec![
            FileInput::new("a.txt", "text/plain", vec![0u8; 1]),
            FileInput::new("b.txt", "text/plain", vec![0u8; 1]),
        ];

        let (accepted, rejected) = intake.filter(inputs);
        assert_eq!(accepted.len(), 1);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].reason, RejectReason::SingleOnly);
    }

    #[test]
    fn test_filter_accept_pattern() {
        let intake = FileIntake {
            accept: "image/*".to_string(),
            ..Default::default()
        };

        let inputs = vec![
            FileInput::new("photo.png", "image/png", vec![0u8; 1]),
            FileInput::new("notes.txt", "text/plain", vec![0u8; 1]),
        ];

        let (accepted, rejected) = intake.filter(inputs);
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].name, "photo.png");
        assert_eq!(rejected[0].reason, RejectReason::MimeMismatch);
    }
}
