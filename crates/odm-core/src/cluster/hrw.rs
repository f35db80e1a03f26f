//! Highest-random-weight (rendezvous) object placement.
//!
//! Every target runs the same pure function over the same cluster map, so
//! all targets agree on ownership with no coordination, and membership
//! changes only move the objects whose winning target changed.

use xxhash_rust::xxh3::{xxh3_64, xxh3_64_with_seed};

use crate::bucket::Bucket;
use crate::error::NotLocal;
use crate::job::DlObj;

use super::Smap;

/// Returns the id of the target that owns `(bck, obj_name)` under `smap`.
/// `None` only when the map has no targets.
pub fn hrw_target<'a>(smap: &'a Smap, bck: &Bucket, obj_name: &str) -> Option<&'a str> {
    let uname = format!("{}/{}", bck.uname(), obj_name);
    let seed = xxh3_64(uname.as_bytes());

    let mut winner: Option<(&str, u64)> = None;
    for sid in smap.targets.keys() {
        let score = xxh3_64_with_seed(sid.as_bytes(), seed);
        match winner {
            Some((_, best)) if score <= best => {}
            _ => winner = Some((sid, score)),
        }
    }
    winner.map(|(sid, _)| sid)
}

/// Builds the work item for `(bck, obj_name)` iff this target owns it;
/// otherwise returns the [`NotLocal`] sentinel, which enumerators translate
/// into a silent skip.
pub fn make_dl_obj(
    smap: &Smap,
    sid: &str,
    bck: &Bucket,
    obj_name: &str,
    link: &str,
) -> Result<DlObj, NotLocal> {
    match hrw_target(smap, bck, obj_name) {
        Some(owner) if owner == sid => Ok(DlObj {
            obj_name: obj_name.to_string(),
            link: link.to_string(),
            from_remote: link.is_empty(),
        }),
        _ => Err(NotLocal),
    }
}
