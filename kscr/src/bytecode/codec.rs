//! Bytecode write/load
//!
//! Layout: the magic `KSCR`, one compression tag byte, then the JSON
//! encoding of the class declarations, compressed per the tag.

use super::ClassDecl;
use crate::config::Compression;
use crate::error::{CompileError, Result};
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use std::io::{Read, Write};
use tracing::debug;

pub const MAGIC: &[u8; 4] = b"KSCR";

/// Encode `classes` into a self-describing byte buffer.
pub fn write(classes: &[ClassDecl], compression: Compression) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(classes).map_err(|e| CompileError::codec(e.to_string()))?;
    let mut out = Vec::with_capacity(json.len() / 2 + 5);
    out.extend_from_slice(MAGIC);
    out.push(compression.tag());
    match compression {
        Compression::None => out.extend_from_slice(&json),
        Compression::Gzip => {
            let mut enc = GzEncoder::new(out, flate2::Compression::default());
            enc.write_all(&json)?;
            out = enc.finish()?;
        }
        Compression::Zlib => {
            let mut enc = ZlibEncoder::new(out, flate2::Compression::default());
            enc.write_all(&json)?;
            out = enc.finish()?;
        }
    }
    debug!(classes = classes.len(), bytes = out.len(), %compression, "wrote bytecode");
    Ok(out)
}

/// Decode a buffer produced by `write`.
pub fn load(data: &[u8]) -> Result<Vec<ClassDecl>> {
    if data.len() < 5 || &data[..4] != MAGIC {
        return Err(CompileError::codec("not a KScr bytecode file"));
    }
    let compression = Compression::from_tag(data[4])
        .ok_or_else(|| CompileError::codec(format!("unknown compression tag {}", data[4])))?;
    let body = &data[5..];
    let json = match compression {
        Compression::None => body.to_vec(),
        Compression::Gzip => {
            let mut buf = Vec::new();
            GzDecoder::new(body).read_to_end(&mut buf)?;
            buf
        }
        Compression::Zlib => {
            let mut buf = Vec::new();
            ZlibDecoder::new(body).read_to_end(&mut buf)?;
            buf
        }
    };
    let classes: Vec<ClassDecl> =
        serde_json::from_slice(&json).map_err(|e| CompileError::codec(e.to_string()))?;
    debug!(classes = classes.len(), %compression, "loaded bytecode");
    Ok(classes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{MemberDecl, MethodDecl, Statement, StatementComponent, ExecutableCode};
    use crate::model::{ClassKind, Modifier};

    fn sample() -> Vec<ClassDecl> {
        let mut class = ClassDecl::new("org.test", "Main", Modifier::PUBLIC, ClassKind::Class);
        let ret = StatementComponent::new(
            crate::bytecode::ComponentRole::Code,
            crate::bytecode::BytecodeKind::Return,
        )
        .with_sub_statement(Statement::expression(vec![StatementComponent::numeric("7")]));
        class.members.push(MemberDecl::Method(MethodDecl {
            name: "main".into(),
            modifier: Modifier::PUBLIC | Modifier::STATIC,
            return_type: "int".into(),
            parameters: Vec::new(),
            body: Some(ExecutableCode::new(vec![Statement::expression(vec![ret])])),
            position: Default::default(),
        }));
        vec![class]
    }

    #[test]
    fn test_round_trip_each_compression() {
        let classes = sample();
        for c in [Compression::None, Compression::Gzip, Compression::Zlib] {
            let bytes = write(&classes, c).unwrap();
            assert_eq!(&bytes[..4], MAGIC);
            assert_eq!(bytes[4], c.tag());
            assert_eq!(load(&bytes).unwrap(), classes);
        }
    }

    #[test]
    fn test_rejects_bad_magic() {
        let err = load(b"NOPE\0[]").unwrap_err();
        assert!(matches!(err, CompileError::Codec { .. }));
    }

    #[test]
    fn test_rejects_unknown_tag() {
        let err = load(b"KSCR\x07[]").unwrap_err();
        assert!(err.message().contains("compression"));
    }

    #[test]
    fn test_empty_input_is_error() {
        assert!(load(&[]).is_err());
    }
}
