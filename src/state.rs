//! Persisted player state: the patch script followed by the content folder.
//!
//! Each string is stored as a little-endian `u32` byte length followed by
//! its UTF-8 bytes.

use crate::error::PlayerError;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerState {
    pub script: String,
    pub content_dir: PathBuf,
}

impl PlayerState {
    pub fn new(script: impl Into<String>, content_dir: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
            content_dir: content_dir.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let content = self.content_dir.to_string_lossy();
        let mut out = Vec::with_capacity(8 + self.script.len() + content.len());
        write_string(&mut out, &self.script);
        write_string(&mut out, &content);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PlayerError> {
        let mut cursor = bytes;
        let script = read_string(&mut cursor, "script")?;
        let content_dir = read_string(&mut cursor, "content folder")?;
        Ok(Self {
            script,
            content_dir: PathBuf::from(content_dir),
        })
    }
}

fn write_string(out: &mut Vec<u8>, value: &str) {
    out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    out.extend_from_slice(value.as_bytes());
}

fn read_string(cursor: &mut &[u8], what: &str) -> Result<String, PlayerError> {
    let Some((len, rest)) = cursor.split_first_chunk::<4>() else {
        return Err(PlayerError::State(format!("missing {} length", what)));
    };
    let len = u32::from_le_bytes(*len) as usize;
    if rest.len() < len {
        return Err(PlayerError::State(format!(
            "{} truncated: expected {} bytes, found {}",
            what,
            len,
            rest.len()
        )));
    }
    let (data, rest) = rest.split_at(len);
    *cursor = rest;
    String::from_utf8(data.to_vec())
        .map_err(|_| PlayerError::State(format!("{} is not valid UTF-8", what)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_length_prefixed() {
        let state = PlayerState::new("ab", "/c");
        assert_eq!(
            state.encode(),
            vec![2, 0, 0, 0, b'a', b'b', 2, 0, 0, 0, b'/', b'c']
        );
    }

    #[test]
    fn decodes_what_it_encodes() {
        let state = PlayerState::new("fn onMidiMessage(msg) { print(msg); }", "/tmp/kit");
        assert_eq!(PlayerState::decode(&state.encode()).unwrap(), state);
        let empty = PlayerState::default();
        assert_eq!(PlayerState::decode(&empty.encode()).unwrap(), empty);
    }

    #[test]
    fn truncated_data_is_rejected() {
        let bytes = PlayerState::new("script", "dir").encode();
        for cut in [0, 3, 6, bytes.len() - 1] {
            assert!(matches!(
                PlayerState::decode(&bytes[..cut]),
                Err(PlayerError::State(_))
            ));
        }
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let bytes = vec![2, 0, 0, 0, 0xff, 0xfe, 0, 0, 0, 0];
        let err = PlayerState::decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("UTF-8"));
    }
}
