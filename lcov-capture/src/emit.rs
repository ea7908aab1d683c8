//! The lcov tracefile writer.
//!
//! One record per source file, in the tables' deterministic order:
//!
//! ```text
//! TN:
//! SF:<path>
//! FN:<line>,<name>            (per function)
//! FNDA:<hits>,<name>          (per function)
//! FNF:<functions found>
//! FNH:<functions hit>
//! BRDA:<line>,<block>,<branch>,<taken or ->
//! BRF:<branches found>
//! BRH:<branches hit>
//! DA:<line>,<count>
//! LF:<lines found>
//! LH:<lines hit>
//! end_of_record
//! ```

use error::Result;

use covinfo::Tables;
use rustc_demangle::demangle as rustc_demangle;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Demangles a raw symbol name for display. The tables stay keyed by the
/// raw name; the demangled form is purely informational.
fn demangle(raw_name: &str) -> String {
    rustc_demangle(raw_name).to_string()
}

/// Writes the whole aggregate into a tracefile at `path`.
pub fn write_tracefile(path: &Path, tables: &Tables) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_records(&mut writer, tables)?;
    writer.flush()?;
    Ok(())
}

fn write_records<W: Write>(writer: &mut W, tables: &Tables) -> Result<()> {
    for (source, functions) in &tables.functions {
        writeln!(writer, "TN:")?;
        writeln!(writer, "SF:{}", source)?;

        let fnf = functions.len();
        let mut fnh = 0;
        for (name, record) in functions {
            writeln!(writer, "FN:{},{}", record.line, name)?;
        }
        for (name, record) in functions {
            if record.hit > 0 {
                fnh += 1;
            }
            debug!("function {} is {}", name, demangle(name));
            writeln!(writer, "FNDA:{},{}", record.hit, name)?;
        }
        writeln!(writer, "FNF:{}", fnf)?;
        writeln!(writer, "FNH:{}", fnh)?;

        if let Some(branches) = tables.branches.get(source) {
            let brf = branches.len();
            let mut brh = 0;
            for (id, &taken) in branches {
                if taken > 0 {
                    brh += 1;
                }
                write!(writer, "BRDA:{},{},{},", id.line, id.block, id.branch)?;
                if taken < 0 {
                    writeln!(writer, "-")?;
                } else {
                    writeln!(writer, "{}", taken)?;
                }
            }
            writeln!(writer, "BRF:{}", brf)?;
            writeln!(writer, "BRH:{}", brh)?;
        }

        if let Some(lines) = tables.lines.get(source) {
            let lf = lines.len();
            let mut lh = 0;
            for (&line, &count) in lines {
                if count > 0 {
                    lh += 1;
                }
                writeln!(writer, "DA:{},{}", line, count)?;
            }
            writeln!(writer, "LF:{}", lf)?;
            writeln!(writer, "LH:{}", lh)?;
        }

        writeln!(writer, "end_of_record")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use covinfo::{BranchId, FunctionRecord, Tables, UNKNOWN_TAKEN};

    fn sample_tables() -> Tables {
        let mut tables = Tables::new();
        {
            let functions = tables.functions.entry("/src/a.c".to_owned()).or_insert_with(Default::default);
            functions.insert("main".to_owned(), FunctionRecord { line: 3, hit: 1 });
            functions.insert("helper".to_owned(), FunctionRecord { line: 9, hit: 0 });
        }
        {
            let lines = tables.lines.entry("/src/a.c".to_owned()).or_insert_with(Default::default);
            lines.insert(3, 1);
            lines.insert(4, 5);
            lines.insert(9, 0);
        }
        {
            let branches = tables.branches.entry("/src/a.c".to_owned()).or_insert_with(Default::default);
            branches.insert(BranchId { line: 4, block: 0, branch: 0 }, 5);
            branches.insert(BranchId { line: 4, block: 0, branch: 1 }, 0);
            branches.insert(BranchId { line: 9, block: 0, branch: 0 }, UNKNOWN_TAKEN);
        }
        tables
    }

    #[test]
    fn tracefile_layout() {
        let mut out = Vec::new();
        write_records(&mut out, &sample_tables()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "TN:\n\
             SF:/src/a.c\n\
             FN:9,helper\n\
             FN:3,main\n\
             FNDA:0,helper\n\
             FNDA:1,main\n\
             FNF:2\n\
             FNH:1\n\
             BRDA:4,0,0,5\n\
             BRDA:4,0,1,0\n\
             BRDA:9,0,0,-\n\
             BRF:3\n\
             BRH:1\n\
             DA:3,1\n\
             DA:4,5\n\
             DA:9,0\n\
             LF:3\n\
             LH:2\n\
             end_of_record\n"
        );
    }

    #[test]
    fn sources_without_branches_skip_the_branch_section() {
        let mut tables = sample_tables();
        tables.branches.clear();
        let mut out = Vec::new();
        write_records(&mut out, &tables).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(!text.contains("BRDA"));
        assert!(!text.contains("BRF"));
        assert!(text.contains("end_of_record"));
    }

    #[test]
    fn demangling_is_informational_only() {
        // the raw symbol stays in the output, demangled or not
        assert_eq!(demangle("_ZN4core3fmt5Debug3fmt17h0123456789abcdefE"), "core::fmt::Debug::fmt::h0123456789abcdef");
    }
}
