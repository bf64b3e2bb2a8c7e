use base64::Engine;
use base64::prelude::BASE64_STANDARD;

/// Build an inline preview for image inputs.
///
/// 图片类型编码为 data URL，其余类型返回 None；本函数对调用方永不失败。
pub async fn generate(content: &[u8], mime_type: &str) -> Option<String> {
    if !mime_type.starts_with("image/") {
        return None;
    }

    Some(format!("data:{};base64,{}", mime_type, BASE64_STANDARD.encode(content)))
}
