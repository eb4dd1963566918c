use std::io::Write;

/// Width of the progress bar column.
const BAR_WIDTH: usize = 30;

/// A pass-through table reporting per-scan progress and
/// log-likelihood during training. Carries no algorithmic state:
/// drivers advance it by work units and it renders a fixed-width
/// bar between the row prologue and the row epilogue.
pub struct ProgressTable<W: Write> {
    out: W,
    total_work: usize,
    work_done: usize,
    bar_printed: usize,
}

impl<W: Write> ProgressTable<W> {
    pub fn new(out: W) -> Self {
        ProgressTable {
            out,
            total_work: 0,
            work_done: 0,
            bar_printed: 0,
        }
    }

    pub fn set_total_work(&mut self, total_work: usize) {
        self.total_work = total_work;
    }

    pub fn print_header(&mut self) -> std::io::Result<()> {
        writeln!(
            self.out,
            "{:<4} {:>4} {:>7}  {:<30}  {:>9}  {:>8}",
            "Scan", "Blks", "Eta", "E-Step", "log(L)", "+/-"
        )?;
        writeln!(self.out, "{}", "-".repeat(70))
    }

    pub fn row_begin(&mut self, scan: usize, num_blocks: usize, eta: f64) -> std::io::Result<()> {
        self.work_done = 0;
        self.bar_printed = 0;
        write!(self.out, "{:<4} {:>4} {:>7.4}  ", scan, num_blocks, eta)?;
        self.out.flush()
    }

    /// Advances the bar by `units` of work.
    pub fn advance(&mut self, units: usize) -> std::io::Result<()> {
        self.work_done += units;
        if self.total_work == 0 {
            return Ok(());
        }
        let target = (BAR_WIDTH * self.work_done / self.total_work).min(BAR_WIDTH);
        while self.bar_printed < target {
            write!(self.out, "=")?;
            self.bar_printed += 1;
        }
        self.out.flush()
    }

    pub fn row_end(&mut self, log_likelihood: f64, change: Option<f64>) -> std::io::Result<()> {
        while self.bar_printed < BAR_WIDTH {
            write!(self.out, "=")?;
            self.bar_printed += 1;
        }
        match change {
            Some(delta) => writeln!(
                self.out,
                "  {:>9.5}  {:>+8.5}",
                log_likelihood, delta
            ),
            None => writeln!(self.out, "  {:>9.5}", log_likelihood),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_renders_full_bar() {
        let mut buf = Vec::new();
        {
            let mut table = ProgressTable::new(&mut buf);
            table.set_total_work(100);
            table.print_header().unwrap();
            table.row_begin(1, 4, 1.0).unwrap();
            for _ in 0..10 {
                table.advance(10).unwrap();
            }
            table.row_end(-1.23456, None).unwrap();
            table.row_begin(2, 4, 1.0).unwrap();
            table.advance(100).unwrap();
            table.row_end(-1.0, Some(0.23456)).unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        let bar = "=".repeat(30);
        assert!(text.contains(&bar));
        assert!(text.contains("+0.23456"));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_advance_without_total_work() {
        let mut buf = Vec::new();
        let mut table = ProgressTable::new(&mut buf);
        table.advance(10).unwrap();
    }
}
