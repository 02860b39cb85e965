// src/output.rs
use crate::error::{ErrorContext, Result};
use crate::types::ScanResult;
use crate::utils::group_by_pattern;
use chrono::Local;
use log::info;
use serde_json::json;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const SUBDIRS: &[&str] = &["subdomains", "raw_outputs", "analysis", "metadata"];

#[derive(Debug, Clone)]
pub struct OutputSettings {
    pub parent_dir: PathBuf,
    pub silent: bool,
    pub verbose: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            parent_dir: PathBuf::from("."),
            silent: false,
            verbose: false,
        }
    }
}

pub struct OutputManager {
    settings: OutputSettings,
}

impl OutputManager {
    pub fn new(settings: OutputSettings) -> Self {
        Self { settings }
    }

    /// Writes the full results folder and returns its path.
    pub fn save(&self, results: &ScanResult) -> Result<PathBuf> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let output_dir = self
            .settings
            .parent_dir
            .join(format!("SubDO_{}_{}", results.target, stamp));

        for subdir in SUBDIRS {
            fs::create_dir_all(output_dir.join(subdir))
                .output_context(|| format!("Failed to create {}", output_dir.join(subdir).display()))?;
        }

        self.write_all_subdomains(&output_dir, results)?;
        self.write_tool_files(&output_dir, results)?;
        self.write_analysis_report(&output_dir, results)?;
        self.write_metadata(&output_dir, results)?;
        self.write_json_summary(&output_dir, results)?;

        info!("Results saved to {}", output_dir.display());
        Ok(output_dir)
    }

    fn write_all_subdomains(&self, dir: &Path, results: &ScanResult) -> Result<()> {
        let path = dir.join(format!("all_subdomains_{}.txt", results.target));
        let mut w = create(&path)?;
        let stats = &results.statistics;

        let header = format!(
            "# SubDO Comprehensive Subdomain Results\n\
             # Target: {}\n\
             # Scan Date: {}\n\
             # Total Subdomains: {}\n\
             # Successful Tools: {}\n\
             # Execution Time: {:.2}s\n\
             # {}\n\n",
            results.target,
            results.scan_info.start_time.to_rfc3339(),
            results.subdomains.len(),
            stats.tools_successful,
            stats.total_execution_time.as_secs_f64(),
            "=".repeat(70)
        );
        w.write_all(header.as_bytes()).output_context(|| path.display().to_string())?;

        for subdomain in &results.subdomains {
            writeln!(w, "{}", subdomain).output_context(|| path.display().to_string())?;
        }
        w.flush().output_context(|| path.display().to_string())
    }

    fn write_tool_files(&self, dir: &Path, results: &ScanResult) -> Result<()> {
        for (name, result) in &results.tool_results {
            if result.success && !result.subdomains.is_empty() {
                let path = dir.join("subdomains").join(format!("{}_subdomains.txt", name));
                let mut w = create(&path)?;
                writeln!(w, "# Tool: {}", name)
                    .and_then(|_| writeln!(w, "# Execution Time: {:.2}s", result.execution_time.as_secs_f64()))
                    .and_then(|_| writeln!(w, "# Subdomains Found: {}", result.subdomains.len()))
                    .and_then(|_| writeln!(w, "# {}\n", "=".repeat(50)))
                    .output_context(|| path.display().to_string())?;
                for subdomain in &result.subdomains {
                    writeln!(w, "{}", subdomain).output_context(|| path.display().to_string())?;
                }
                w.flush().output_context(|| path.display().to_string())?;
            }

            if !result.other_output.is_empty() {
                let path = dir.join("raw_outputs").join(format!("{}_raw.txt", name));
                let mut w = create(&path)?;
                writeln!(w, "# Raw output from {}", name)
                    .and_then(|_| writeln!(w, "# {}\n", "=".repeat(50)))
                    .output_context(|| path.display().to_string())?;
                for line in &result.other_output {
                    writeln!(w, "{}", line).output_context(|| path.display().to_string())?;
                }
                w.flush().output_context(|| path.display().to_string())?;
            }
        }
        Ok(())
    }

    fn write_analysis_report(&self, dir: &Path, results: &ScanResult) -> Result<()> {
        let path = dir.join("analysis").join("comprehensive_report.txt");
        let report = render_report(results);
        fs::write(&path, report).output_context(|| path.display().to_string())
    }

    fn write_metadata(&self, dir: &Path, results: &ScanResult) -> Result<()> {
        let path = dir.join("metadata").join("scan_metadata.json");
        let tools_used: Vec<_> = results
            .tool_results
            .iter()
            .map(|(name, r)| {
                json!({
                    "name": name,
                    "success": r.success,
                    "error": r.error_kind,
                    "return_code": r.return_code,
                    "execution_time": r.execution_time.as_secs_f64(),
                    "subdomains_found": r.subdomains.len(),
                })
            })
            .collect();

        let metadata = json!({
            "subdo_version": crate::VERSION,
            "scan_configuration": {
                "target": results.target,
                "threads": results.scan_info.threads_used,
                "timeout": results.scan_info.timeout_per_tool.as_secs(),
                "silent_mode": self.settings.silent,
                "verbose_mode": self.settings.verbose,
            },
            "scan_info": {
                "start_time": results.scan_info.start_time.to_rfc3339(),
                "end_time": results.scan_info.end_time.to_rfc3339(),
                "interrupted": results.interrupted,
                "skipped_tools": results.skipped_tools,
            },
            "statistics": {
                "tools_run": results.statistics.tools_run,
                "tools_successful": results.statistics.tools_successful,
                "tools_failed": results.statistics.tools_failed,
                "total_subdomains": results.statistics.total_subdomains_before_dedup,
                "unique_subdomains": results.statistics.unique_subdomains,
                "execution_time": results.statistics.total_execution_time.as_secs_f64(),
            },
            "tools_used": tools_used,
        });

        write_json(&path, &metadata)
    }

    fn write_json_summary(&self, dir: &Path, results: &ScanResult) -> Result<()> {
        let path = dir.join(format!("subdomains_{}.json", results.target));
        let tools_summary: serde_json::Map<String, serde_json::Value> = results
            .tool_results
            .iter()
            .map(|(name, r)| {
                (
                    name.clone(),
                    json!({
                        "success": r.success,
                        "subdomains_count": r.subdomains.len(),
                        "execution_time": r.execution_time.as_secs_f64(),
                    }),
                )
            })
            .collect();

        let summary = json!({
            "target": results.target,
            "total_subdomains": results.subdomains.len(),
            "scan_date": results.scan_info.start_time.to_rfc3339(),
            "execution_time": results.statistics.total_execution_time.as_secs_f64(),
            "subdomains": results.subdomains,
            "tools_summary": tools_summary,
        });

        write_json(&path, &summary)
    }

    /// Prints the end-of-scan summary. Silent mode prints only the folder path,
    /// or the bare subdomains when nothing was saved.
    pub fn print_summary(&self, results: &ScanResult, output_dir: Option<&Path>) {
        if self.settings.silent {
            match output_dir {
                Some(dir) => println!("{}", dir.display()),
                None => results.subdomains.iter().for_each(|s| println!("{}", s)),
            }
            return;
        }

        let stats = &results.statistics;
        println!("\n[*] RECONNAISSANCE COMPLETE");
        if results.interrupted {
            println!("[!] Scan was interrupted; {} tools were not started", results.skipped_tools.len());
        }
        println!("[*] Target Domain: {}", results.target);
        println!("[*] Total Subdomains: {}", results.subdomains.len());
        println!("[*] Execution Time: {:.2}s", stats.total_execution_time.as_secs_f64());
        println!("[*] Tools Used: {}/{}", stats.tools_successful, stats.tools_run);
        if let Some(dir) = output_dir {
            println!("[*] Output Directory: {}", dir.display());
        }

        println!("\n[*] Tool Performance Summary:");
        println!("{:<12} {:<14} {:<10} {:<8}", "Tool", "Status", "Subdomains", "Time");
        println!("{}", "-".repeat(50));
        for (name, r) in &results.tool_results {
            println!(
                "{:<12} {:<14} {:<10} {:<8.1}",
                name,
                status_label(r),
                r.subdomains.len(),
                r.execution_time.as_secs_f64()
            );
        }

        let groups = group_by_pattern(&results.subdomains);
        if !groups.is_empty() {
            println!("\n[*] Quick Analysis:");
            for (label, matches) in groups {
                println!("   {}: {} subdomains", label.to_uppercase(), matches.len());
            }
        }

        if output_dir.is_none() {
            println!("\n[*] Results:");
            for subdomain in &results.subdomains {
                println!("{}", subdomain);
            }
        }
    }
}

fn status_label(result: &crate::types::ToolResult) -> String {
    match result.error_kind {
        None => "SUCCESS".to_string(),
        Some(kind) => format!("FAILED ({})", kind),
    }
}

fn render_report(results: &ScanResult) -> String {
    let stats = &results.statistics;
    let mut out = String::new();

    out.push_str(&format!("{}\n", "=".repeat(90)));
    out.push_str("           SUBDO COMPREHENSIVE RECONNAISSANCE REPORT\n");
    out.push_str(&format!("{}\n\n", "=".repeat(90)));

    out.push_str("EXECUTIVE SUMMARY\n");
    out.push_str(&format!("{}\n", "-".repeat(50)));
    out.push_str(&format!("Target Domain: {}\n", results.target));
    out.push_str(&format!("Scan Date: {}\n", results.scan_info.start_time.to_rfc3339()));
    out.push_str(&format!(
        "Total Execution Time: {:.2} seconds\n",
        stats.total_execution_time.as_secs_f64()
    ));
    out.push_str(&format!("Unique Subdomains Discovered: {}\n", results.subdomains.len()));
    out.push_str(&format!("Tools Executed: {}\n", stats.tools_run));
    out.push_str(&format!("Successful Tools: {}\n", stats.tools_successful));
    out.push_str(&format!("Failed Tools: {}\n", stats.tools_failed));
    out.push_str(&format!("Success Rate: {:.1}%\n\n", stats.success_rate()));

    out.push_str("TOOL PERFORMANCE ANALYSIS\n");
    out.push_str(&format!("{}\n", "-".repeat(50)));
    out.push_str(&format!(
        "{:<15} {:<22} {:<12} {:<8}\n",
        "Tool", "Status", "Subdomains", "Time(s)"
    ));
    out.push_str(&format!("{}\n", "-".repeat(90)));
    for (name, r) in &results.tool_results {
        out.push_str(&format!(
            "{:<15} {:<22} {:<12} {:<8.1}\n",
            name,
            status_label(r),
            r.subdomains.len(),
            r.execution_time.as_secs_f64()
        ));
    }

    out.push_str("\n\nSUBDOMAIN ANALYSIS\n");
    out.push_str(&format!("{}\n", "-".repeat(50)));
    for (label, matches) in group_by_pattern(&results.subdomains) {
        let shown: Vec<&str> = matches.iter().take(5).copied().collect();
        out.push_str(&format!(
            "{} Subdomains ({}): {}",
            label.to_uppercase(),
            matches.len(),
            shown.join(", ")
        ));
        if matches.len() > 5 {
            out.push_str(&format!(" ... and {} more", matches.len() - 5));
        }
        out.push('\n');
    }

    out.push_str("\n\nCOMPLETE SUBDOMAIN INVENTORY\n");
    out.push_str(&format!("{}\n", "-".repeat(50)));
    for (i, subdomain) in results.subdomains.iter().enumerate() {
        out.push_str(&format!("{:4}. {}\n", i + 1, subdomain));
    }

    out
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    File::create(path)
        .map(BufWriter::new)
        .output_context(|| format!("Failed to create {}", path.display()))
}

fn write_json(path: &Path, value: &serde_json::Value) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .output_context(|| "Failed to serialize JSON".to_string())?;
    fs::write(path, json).output_context(|| path.display().to_string())
}
