//! Run diagnostics
//!
//! Every degraded decision the engine makes (contig left singleton, gap
//! left as filler, abstained-on cycle, unresolved component) surfaces here,
//! never silently dropped.

use crate::gapfill::{FillDisposition, FillOutcome};
use crate::scaffold::Interpretation;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub genome: String,
    pub contigs_total: usize,
    pub probes_total: usize,
    pub contigs_scaffolded: usize,
    pub contigs_singleton: usize,
    pub chains: usize,
    pub circular_chains: usize,
    pub unconnected_probes: usize,
    pub unresolved_components: usize,
    pub conflicted_connections: usize,
    pub gaps_total: usize,
    pub gaps_filled: usize,
    pub gaps_filler: usize,
    pub gaps_too_ambiguous: usize,
    pub cycles_abstained: usize,
    pub variants: usize,
}

impl RunReport {
    pub fn new(genome: &str) -> Self {
        Self {
            genome: genome.to_string(),
            ..Self::default()
        }
    }

    pub fn record_interpretation(&mut self, interp: &Interpretation) {
        self.chains = interp.chains.len();
        for chain in &interp.chains {
            if chain.is_singleton() {
                self.contigs_singleton += 1;
            } else {
                self.contigs_scaffolded += chain.links.len();
            }
            if chain.circular {
                self.circular_chains += 1;
            }
        }
        self.unconnected_probes = interp.unconnected.len();
        self.unresolved_components = interp.diagnostics.unresolved_components;
        self.conflicted_connections = interp.diagnostics.conflicted_connections;
    }

    pub fn record_fill(&mut self, fill: &FillOutcome) {
        self.gaps_total += 1;
        match fill.disposition {
            FillDisposition::Filled => self.gaps_filled += 1,
            FillDisposition::NoPath => self.gaps_filler += 1,
            FillDisposition::TooAmbiguous => {
                self.gaps_filler += 1;
                self.gaps_too_ambiguous += 1;
            }
            FillDisposition::CycleAbstained => {
                self.gaps_filler += 1;
                self.cycles_abstained += 1;
            }
        }
        self.variants += fill.variants.len();
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("genome: {}\n", self.genome));
        out.push_str(&format!(
            "contigs: {} total, {} scaffolded, {} singleton\n",
            self.contigs_total, self.contigs_scaffolded, self.contigs_singleton
        ));
        out.push_str(&format!(
            "chains: {} ({} circular), {} unconnected probe ends\n",
            self.chains, self.circular_chains, self.unconnected_probes
        ));
        out.push_str(&format!(
            "conflicts: {} connections voided, {} unresolved components\n",
            self.conflicted_connections, self.unresolved_components
        ));
        out.push_str(&format!(
            "gaps: {} total, {} filled, {} left as filler \
             ({} too ambiguous, {} cycle abstentions)\n",
            self.gaps_total,
            self.gaps_filled,
            self.gaps_filler,
            self.gaps_too_ambiguous,
            self.cycles_abstained
        ));
        out.push_str(&format!("variants: {}\n", self.variants));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SeqPos;

    fn fill(disposition: FillDisposition) -> FillOutcome {
        FillOutcome {
            path_count: 0,
            sequence: None,
            variants: Vec::new(),
            filled: disposition == FillDisposition::Filled,
            filler_len: 10 as SeqPos,
            disposition,
        }
    }

    #[test]
    fn test_fill_accounting() {
        let mut report = RunReport::new("test");
        report.record_fill(&fill(FillDisposition::Filled));
        report.record_fill(&fill(FillDisposition::NoPath));
        report.record_fill(&fill(FillDisposition::TooAmbiguous));
        report.record_fill(&fill(FillDisposition::CycleAbstained));

        assert_eq!(report.gaps_total, 4);
        assert_eq!(report.gaps_filled, 1);
        assert_eq!(report.gaps_filler, 3);
        assert_eq!(report.gaps_too_ambiguous, 1);
        assert_eq!(report.cycles_abstained, 1);
    }

    #[test]
    fn test_render_mentions_every_degradation() {
        let mut report = RunReport::new("g1");
        report.record_fill(&fill(FillDisposition::CycleAbstained));
        let text = report.render();
        assert!(text.contains("genome: g1"));
        assert!(text.contains("1 cycle abstentions"));
    }
}
