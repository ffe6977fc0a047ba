//! Component F — directory header codec.
//!
//! Pre-order serialization of a [`Tree`]: each directory writes its child
//! count followed by each child's name-tagged entry, recursing into
//! sub-directories and, for files, writing a type tag plus a payload
//! offset into the blob pool that follows the header (spec.md §4.F).

use crate::error::{Error, Result};
use crate::io::{min_bytes, read_uint, write_uint};
use crate::tree::{EntryOp, Kind, Node, NodeId, Tree, ROOT};

pub(crate) const MAGIC: [u8; 4] = [b'X', b'X', b'X', 0x80];

pub(crate) const TAG_DIFF: u8 = 0x00;
pub(crate) const TAG_ADD: u8 = 0x01;
pub(crate) const TAG_DELETE: u8 = 0x02;

const NAME_LEN_MASK: u8 = 0x7F;
const NAME_IS_FILE: u8 = 0x80;

/// Serializes `tree`'s children (the root's own name is never written).
/// `w_pos` sizes both the whole-file-addition frame widths (`w_ack`) and
/// blob-pool offsets; both are folded into one prelude byte per spec.md
/// §4.F, so callers pass the same width for both roles unless they have a
/// specific reason to diverge.
pub(crate) fn serialize(tree: &Tree, w_ack: u8, w_pos: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);
    out.push((w_ack << 4) | w_pos);
    write_directory(&mut out, tree, ROOT, w_pos)?;
    Ok(out)
}

fn write_directory(out: &mut Vec<u8>, tree: &Tree, dir: NodeId, w_pos: u8) -> Result<()> {
    let children = &tree.node(dir).children;
    write_uint(out, children.len() as u64, 2);
    for &child_id in children {
        write_entry(out, tree, child_id, w_pos)?;
    }
    Ok(())
}

fn write_entry(out: &mut Vec<u8>, tree: &Tree, id: NodeId, w_pos: u8) -> Result<()> {
    let node = tree.node(id);
    write_name(out, node)?;
    match node.kind {
        Kind::Directory => write_directory(out, tree, id, w_pos),
        Kind::File => {
            match node.op {
                EntryOp::Diff { offset } => {
                    out.push(TAG_DIFF);
                    write_uint(out, offset, w_pos);
                }
                EntryOp::Add { offset, selector } => {
                    out.push(TAG_ADD | (selector << 4));
                    write_uint(out, offset, w_pos);
                }
                EntryOp::Delete => {
                    out.push(TAG_DELETE);
                }
                EntryOp::Unset => {
                    // A file node reached serialization without ever being
                    // assigned a real operation. There's no wire tag for
                    // this, and coercing it to any one of the three real
                    // tags would silently misrepresent the entry — refuse
                    // instead (callers are expected to never hand such a
                    // node to `serialize` in the first place).
                    return Err(Error::UnassignedEntry(tree.path_of(id)));
                }
            }
            Ok(())
        }
    }
}

fn write_name(out: &mut Vec<u8>, node: &Node) -> Result<()> {
    let name_bytes = node.name.as_bytes();
    if name_bytes.len() > NAME_LEN_MASK as usize {
        return Err(Error::NameTooLong);
    }
    let is_file = matches!(node.kind, Kind::File);
    let tag = (name_bytes.len() as u8 & NAME_LEN_MASK) | if is_file { NAME_IS_FILE } else { 0 };
    out.push(tag);
    out.extend_from_slice(name_bytes);
    Ok(())
}

/// Parses a directory header into a fresh [`Tree`]. Returns the tree and
/// the byte offset immediately past the header — the blob pool (`pool_base`
/// in spec.md §4.G) begins there.
pub(crate) fn deserialize(patch: &[u8]) -> Result<(Tree, u8, u8, usize)> {
    if patch.len() < 5 || patch[..4] != MAGIC {
        return Err(Error::InvalidDirectoryMagic);
    }
    let widths_byte = patch[4];
    let w_ack = widths_byte >> 4;
    let w_pos = widths_byte & 0x0F;

    let mut tree = Tree::new();
    let mut pos = 5usize;
    read_directory(patch, &mut pos, &mut tree, ROOT, w_pos)?;
    Ok((tree, w_ack, w_pos, pos))
}

fn read_directory(
    patch: &[u8],
    pos: &mut usize,
    tree: &mut Tree,
    dir: NodeId,
    w_pos: u8,
) -> Result<()> {
    if *pos + 2 > patch.len() {
        return Err(Error::TruncatedPatch);
    }
    let child_count = read_uint(&patch[*pos..*pos + 2], 2);
    *pos += 2;

    for _ in 0..child_count {
        read_entry(patch, pos, tree, dir, w_pos)?;
    }
    Ok(())
}

fn read_entry(patch: &[u8], pos: &mut usize, tree: &mut Tree, parent: NodeId, w_pos: u8) -> Result<()> {
    if *pos >= patch.len() {
        return Err(Error::TruncatedPatch);
    }
    let name_tag = patch[*pos];
    *pos += 1;
    let is_file = name_tag & NAME_IS_FILE != 0;
    let name_len = (name_tag & NAME_LEN_MASK) as usize;
    if *pos + name_len > patch.len() {
        return Err(Error::TruncatedPatch);
    }
    let name = String::from_utf8_lossy(&patch[*pos..*pos + name_len]).into_owned();
    *pos += name_len;

    let id = tree.new_child(parent, name, if is_file { Kind::File } else { Kind::Directory });

    if is_file {
        if *pos >= patch.len() {
            return Err(Error::TruncatedPatch);
        }
        let type_tag = patch[*pos];
        *pos += 1;
        let base_tag = type_tag & 0x0F;
        let op = match base_tag {
            TAG_DIFF => {
                let offset = read_pool_offset(patch, pos, w_pos)?;
                EntryOp::Diff { offset }
            }
            TAG_ADD => {
                let selector = type_tag >> 4;
                let offset = read_pool_offset(patch, pos, w_pos)?;
                EntryOp::Add { offset, selector }
            }
            TAG_DELETE => EntryOp::Delete,
            _ => return Err(Error::TruncatedPatch),
        };
        tree.node_mut(id).op = op;
    } else {
        read_directory(patch, pos, tree, id, w_pos)?;
    }
    Ok(())
}

fn read_pool_offset(patch: &[u8], pos: &mut usize, w_pos: u8) -> Result<u64> {
    if *pos + w_pos as usize > patch.len() {
        return Err(Error::TruncatedPatch);
    }
    let v = read_uint(&patch[*pos..*pos + w_pos as usize], w_pos);
    *pos += w_pos as usize;
    Ok(v)
}

/// Computes `(w_ack, w_pos)`: the width needed for the largest whole-file-
/// addition frame length, and the width needed for the largest pool offset.
/// Callers compute both maxima over the finished blob pool before calling
/// [`serialize`].
#[must_use]
pub(crate) fn widths_for(max_frame_len: u64, max_pool_offset: u64) -> (u8, u8) {
    (min_bytes(max_frame_len), min_bytes(max_pool_offset))
}
