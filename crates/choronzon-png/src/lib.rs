#![deny(missing_docs)]
//! Reference PNG format plug-in.
//!
//! Not part of the fuzzing core: this crate exists to make the
//! engine runnable end-to-end in tests and via the `replay` CLI path, the
//! way a real campaign would plug in a format-specific parser. A PNG file
//! is modeled as a root `"PNG"` gene whose structural children are one gene
//! per chunk (kind = the 4-byte chunk type tag, payload = chunk data), plus
//! a leading `"SIG"` gene holding the 8-byte PNG signature, marked
//! `essential` and `leaf` and *not* `structural` so it is excluded from
//! structural recombination.

use choronzon_core::ChoronzonError;
use choronzon_format::errors::{parse_error, serialization_error};
use choronzon_format::FormatPlugin;
use choronzon_gene::{AdmissibilityOracle, Chromosome, ChromosomeId, Gene, GeneFlags, GeneKind};

const SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const ROOT_KIND: &str = "PNG";
const SIG_KIND: &str = "SIG";

/// The reference PNG plug-in.
#[derive(Debug, Default, Clone, Copy)]
pub struct PngPlugin;

impl PngPlugin {
    /// Creates a new plug-in instance.
    pub fn new() -> Self {
        Self
    }
}

impl AdmissibilityOracle for PngPlugin {
    fn admissible(&self, parent_kind: &GeneKind, child_kind: &GeneKind, _position: usize) -> bool {
        parent_kind.as_str() == ROOT_KIND
            && child_kind.as_str() != SIG_KIND
            && child_kind.as_str().len() == 4
            && child_kind.as_str().bytes().all(|b| b.is_ascii_alphabetic())
    }
}

impl FormatPlugin for PngPlugin {
    fn name(&self) -> &'static str {
        "png"
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Chromosome, ChoronzonError> {
        if bytes.len() < SIGNATURE.len() || bytes[..SIGNATURE.len()] != SIGNATURE {
            return Err(parse_error("png-bad-signature", "missing PNG signature"));
        }
        let mut offset = SIGNATURE.len();
        let mut chunks = Vec::new();
        while offset < bytes.len() {
            if offset + 8 > bytes.len() {
                return Err(parse_error("png-truncated-header", "truncated chunk header"));
            }
            let length = u32::from_be_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
            let tag = &bytes[offset + 4..offset + 8];
            let tag_str = std::str::from_utf8(tag)
                .map_err(|_| parse_error("png-bad-tag", "chunk type is not valid ASCII"))?;
            if tag_str.len() != 4 || !tag_str.bytes().all(|b| b.is_ascii_alphabetic()) {
                return Err(parse_error("png-bad-tag", "chunk type is not a valid tag"));
            }
            let data_start = offset + 8;
            let data_end = data_start
                .checked_add(length)
                .ok_or_else(|| parse_error("png-length-overflow", "chunk length overflowed"))?;
            if data_end + 4 > bytes.len() {
                return Err(parse_error("png-truncated-data", "truncated chunk data or CRC"));
            }
            let data = bytes[data_start..data_end].to_vec();
            // CRC is validated but not retained: the plug-in recomputes it on
            // serialize, per the "auto-recomputed fields" clause of the contract.
            let is_end = tag_str == "IEND";
            chunks.push(Gene::leaf(
                tag_str,
                data,
                GeneFlags::structural().with_essential(tag_str == "IHDR" || tag_str == "IEND"),
            ));
            offset = data_end + 4;
            if is_end {
                break;
            }
        }
        let sig_gene = Gene::leaf(SIG_KIND, SIGNATURE.to_vec(), GeneFlags::essential_leaf());
        let mut children = vec![sig_gene];
        children.extend(chunks);
        let root = Gene::new(ROOT_KIND, Vec::new(), GeneFlags::structural(), children);
        let id = ChromosomeId::from_bytes(bytes, 0);
        Ok(Chromosome::seed(root, id))
    }

    fn serialize(&self, chromosome: &Chromosome) -> Result<Vec<u8>, ChoronzonError> {
        if chromosome.root.kind().as_str() != ROOT_KIND {
            return Err(serialization_error(
                "png-bad-root",
                "chromosome root is not a PNG tree",
            ));
        }
        for required in ["IHDR", "IEND"] {
            if !chromosome
                .root
                .walk()
                .any(|(_, node)| node.kind.as_str() == required)
            {
                return Err(serialization_error(
                    "png-missing-essential-chunk",
                    format!("chromosome has no {required} gene, which is essential"),
                ));
            }
        }
        let mut out = Vec::new();
        for (index, child) in chromosome.root.children().into_iter().enumerate() {
            if index == 0 {
                if child.kind().as_str() != SIG_KIND {
                    return Err(serialization_error(
                        "png-missing-signature",
                        "first child must be the PNG signature gene",
                    ));
                }
                out.extend_from_slice(child.payload());
                continue;
            }
            let tag = child.kind().as_str();
            let tag_bytes = pad_tag(tag);
            let data = child.payload();
            let length = u32::try_from(data.len()).map_err(|_| {
                serialization_error("png-chunk-too-large", "chunk payload exceeds u32::MAX")
            })?;
            out.extend_from_slice(&length.to_be_bytes());
            out.extend_from_slice(&tag_bytes);
            out.extend_from_slice(data);
            let mut hasher = crc32fast::Hasher::new();
            hasher.update(&tag_bytes);
            hasher.update(data);
            out.extend_from_slice(&hasher.finalize().to_be_bytes());
        }
        Ok(out)
    }
}

fn pad_tag(tag: &str) -> [u8; 4] {
    let mut out = [b'?'; 4];
    for (slot, byte) in out.iter_mut().zip(tag.as_bytes().iter()) {
        *slot = *byte;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_png_bytes() -> Vec<u8> {
        let mut bytes = SIGNATURE.to_vec();
        push_chunk(&mut bytes, b"IHDR", &[0u8; 13]);
        push_chunk(&mut bytes, b"IDAT", &[1, 2, 3]);
        push_chunk(&mut bytes, b"IEND", &[]);
        bytes
    }

    fn push_chunk(out: &mut Vec<u8>, tag: &[u8; 4], data: &[u8]) {
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(tag);
        out.extend_from_slice(data);
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(tag);
        hasher.update(data);
        out.extend_from_slice(&hasher.finalize().to_be_bytes());
    }

    #[test]
    fn deserialize_yields_four_structural_children_in_order() {
        let plugin = PngPlugin::new();
        let bytes = minimal_png_bytes();
        let chromosome = plugin.deserialize(&bytes).unwrap();
        let kinds: Vec<String> = chromosome
            .root
            .children()
            .iter()
            .map(|c| c.kind().to_string())
            .collect();
        assert_eq!(kinds, vec!["SIG", "IHDR", "IDAT", "IEND"]);
    }

    #[test]
    fn round_trip_reproduces_input_byte_for_byte() {
        let plugin = PngPlugin::new();
        let bytes = minimal_png_bytes();
        let chromosome = plugin.deserialize(&bytes).unwrap();
        let out = plugin.serialize(&chromosome).unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn round_trip_then_redeserialize_is_structurally_equal() {
        let plugin = PngPlugin::new();
        let bytes = minimal_png_bytes();
        let chromosome = plugin.deserialize(&bytes).unwrap();
        let out = plugin.serialize(&chromosome).unwrap();
        let reparsed = plugin.deserialize(&out).unwrap();
        assert_eq!(chromosome.root, reparsed.root);
    }

    #[test]
    fn rejects_missing_signature() {
        let plugin = PngPlugin::new();
        assert!(plugin.deserialize(b"not a png").is_err());
    }

    #[test]
    fn admissibility_excludes_signature_kind() {
        let plugin = PngPlugin::new();
        let png: GeneKind = ROOT_KIND.into();
        let sig: GeneKind = SIG_KIND.into();
        let idat: GeneKind = "IDAT".into();
        assert!(!plugin.admissible(&png, &sig, 1));
        assert!(plugin.admissible(&png, &idat, 1));
    }

    #[test]
    fn serialize_rejects_a_tree_missing_an_essential_chunk() {
        let plugin = PngPlugin::new();
        let sig = Gene::leaf(SIG_KIND, SIGNATURE.to_vec(), GeneFlags::essential_leaf());
        let idat = Gene::leaf("IDAT", vec![1, 2, 3], GeneFlags::structural());
        let root = Gene::new(ROOT_KIND, Vec::new(), GeneFlags::structural(), vec![sig, idat]);
        let chromosome = Chromosome::seed(root, ChromosomeId::from_bytes(b"missing-ihdr", 0));
        assert!(plugin.serialize(&chromosome).is_err());
    }
}
