//! Plain-text tables for terminal output.

use colored::Colorize;
use lineage_model::{split_instance_id, CrossLink, LineageRow, Stage, Table, TargetCandidate};
use std::collections::BTreeMap;

/// Left-aligned columns separated by two spaces, header underlined with `-`.
fn layout(header: &[&str], rows: &[Vec<String>]) -> Vec<String> {
    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let line = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{c:<w$}", w = *w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = Vec::with_capacity(rows.len() + 2);
    out.push(line(header.to_vec()));
    out.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  "),
    );
    for row in rows {
        out.push(line(row.iter().map(String::as_str).collect()));
    }
    out
}

pub fn print_lineage(rows: &[LineageRow]) {
    let header = [
        "CHAIN", "STEP", "LVL", "MAPPING", "FROM", "TO", "OPERATION", "EXPRESSION", "JOIN",
    ];
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|r| {
            vec![
                r.chain_id.to_string(),
                r.step_no.to_string(),
                r.level.to_string(),
                r.mapping.clone(),
                format!("{}.{}", r.from_instance, r.from_port),
                format!("{}.{}", r.to_instance, r.to_port),
                r.operation.clone(),
                r.expression.clone(),
                r.join_condition.clone(),
            ]
        })
        .collect();

    let lines = layout(&header, &cells);
    println!("{}", lines[0].bold());
    println!("{}", lines[1].dimmed());
    for (line, row) in lines[2..].iter().zip(rows) {
        if row.stage == Stage::CrossWorkflow {
            println!("{}", line.yellow());
        } else {
            println!("{line}");
        }
    }
}

pub fn print_candidates(candidates: &[TargetCandidate]) {
    let header = ["#", "MAPPING", "INSTANCE", "PORT", "PORT ID"];
    let cells: Vec<Vec<String>> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            vec![
                (i + 1).to_string(),
                c.mapping_name.clone(),
                c.instance_name.clone(),
                c.port_name.clone(),
                c.port_id.clone(),
            ]
        })
        .collect();
    print_plain(&layout(&header, &cells));
}

/// `MAPPING.INSTANCE` using the mapping's name when it is known.
fn endpoint(instance_id: &str, mapping_id: &str, names: &BTreeMap<String, String>) -> String {
    let mapping = names.get(mapping_id).map_or(mapping_id, String::as_str);
    match split_instance_id(instance_id) {
        Some((_, inst)) => format!("{mapping}.{inst}"),
        None => instance_id.to_string(),
    }
}

fn link_cells(links: &[CrossLink], names: &BTreeMap<String, String>) -> Vec<Vec<String>> {
    links
        .iter()
        .map(|l| {
            vec![
                l.full_name.clone(),
                endpoint(&l.target_instance_id, &l.target_mapping_id, names),
                endpoint(&l.source_instance_id, &l.source_mapping_id, names),
            ]
        })
        .collect()
}

pub fn print_links(links: &[CrossLink], names: &BTreeMap<String, String>) {
    let header = ["FULL NAME", "WRITTEN BY", "READ BY"];
    print_plain(&layout(&header, &link_cells(links, names)));
}

pub fn print_counts(counts: &BTreeMap<Table, usize>) {
    let cells: Vec<Vec<String>> = counts
        .iter()
        .map(|(t, n)| vec![t.to_string(), n.to_string()])
        .collect();
    print_plain(&layout(&["TABLE", "ROWS"], &cells));
}

fn print_plain(lines: &[String]) {
    if let Some((head, rest)) = lines.split_first() {
        println!("{}", head.bold());
        for line in rest {
            println!("{line}");
        }
    }
}
