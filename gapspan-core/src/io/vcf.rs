//! Variant table writer
//!
//! Emits the variants recorded at ambiguous gap fills as a minimal
//! VCF-style table: one record per variant with the scaffold name, the
//! 1-based final coordinate, and the reference/alternate alleles.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::Result;

use crate::assemble::AssembledScaffold;

pub fn write_variants<P: AsRef<Path>>(path: P, scaffolds: &[AssembledScaffold]) -> Result<()> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);

    writeln!(w, "##fileformat=VCFv4.2")?;
    writeln!(w, "##source=gapspan-{}", crate::VERSION)?;
    writeln!(
        w,
        "##INFO=<ID=GF,Number=0,Type=Flag,Description=\"Disagreement between candidate gap-bridging paths\">"
    )?;
    for scaffold in scaffolds {
        writeln!(
            w,
            "##contig=<ID={},length={}>",
            scaffold.name,
            scaffold.sequence.len()
        )?;
    }
    writeln!(w, "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO")?;

    for scaffold in scaffolds {
        for variant in &scaffold.variants {
            let alts = variant
                .alternates
                .iter()
                .map(|a| String::from_utf8_lossy(a).into_owned())
                .collect::<Vec<_>>()
                .join(",");
            writeln!(
                w,
                "{}\t{}\t.\t{}\t{}\t.\t.\tGF",
                scaffold.name,
                variant.position + 1,
                String::from_utf8_lossy(&variant.reference),
                alts
            )?;
        }
    }

    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Variant;

    #[test]
    fn test_variant_records() {
        let scaffold = AssembledScaffold {
            name: "scaffold1".to_string(),
            circular: false,
            contigs: vec!["ctgA".to_string()],
            sequence: b"ACGTACGT".to_vec(),
            variants: vec![Variant::new(
                3,
                b"T".to_vec(),
                vec![b"G".to_vec(), b"C".to_vec()],
            )],
            emitted_reverse: false,
        };

        let file = tempfile::NamedTempFile::new().unwrap();
        write_variants(file.path(), &[scaffold]).unwrap();

        let text = std::fs::read_to_string(file.path()).unwrap();
        assert!(text.starts_with("##fileformat=VCFv4.2"));
        assert!(text.contains("##contig=<ID=scaffold1,length=8>"));
        // 0-based position 3 is reported 1-based.
        assert!(text.contains("scaffold1\t4\t.\tT\tG,C\t.\t.\tGF"));
    }

    #[test]
    fn test_no_variants_still_writes_header() {
        let file = tempfile::NamedTempFile::new().unwrap();
        write_variants(file.path(), &[]).unwrap();

        let text = std::fs::read_to_string(file.path()).unwrap();
        assert!(text.contains("#CHROM\tPOS"));
    }
}
