use promptweave::{MutationOp, RewriteResultVerbose, TraceEvent};

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    pub struct Palette {
        enabled: bool,
    }

    impl Palette {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
            if self.enabled { format!("{}{}{}", color, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", BOLD, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", DIM, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }
    }
}

pub fn print_run(result: &RewriteResultVerbose, color: bool) {
    let palette = ansi::Palette::new(color);
    println!("\n{}", palette.bold(palette.paint("⚙  Rewrite trace", ansi::CYAN)));

    for trace in &result.details.traces {
        println!(
            "\n{}",
            palette.paint(format!("━━━ region {} │ {} ━━━", trace.region, trace.file), ansi::GRAY)
        );
        if trace.events.is_empty() {
            println!("{}", palette.dim("  no rules"));
        } else {
            print_events(&trace.events, &palette);
        }
    }

    println!("\n{}", palette.paint("━━━ Results ━━━", ansi::GRAY));
    print_document("positive", &result.positive, &palette);
    print_document("negative", &result.negative, &palette);

    println!("\n{}", palette.paint("━━━ Timing ━━━", ansi::GRAY));
    println!(
        "  Total: {}  │  Regions: {}",
        palette.paint(format!("{:?}", result.elapsed), ansi::GREEN),
        palette.paint(result.details.regions.to_string(), ansi::CYAN),
    );
    println!();
}

fn print_document(label: &str, text: &str, palette: &ansi::Palette) {
    println!("  {}", palette.paint(format!("{label}:"), ansi::BLUE));
    if text.is_empty() {
        println!("    {}", palette.dim("(empty)"));
    } else {
        for line in text.lines() {
            println!("    {}", palette.bold(palette.paint(line, ansi::GREEN)));
        }
    }
}

fn print_events(events: &[TraceEvent], palette: &ansi::Palette) {
    let mut depth = 1usize;
    for event in events {
        let indent = "  ".repeat(depth);
        match event {
            TraceEvent::EnterRule { label, kind, name } => {
                let glyph = match *kind {
                    "group" | "switch" => ">",
                    _ => "$",
                };
                let title = match name {
                    Some(name) => format!("{label} {kind} \"{name}\""),
                    None => format!("{label} {kind}"),
                };
                println!("{indent}{} {}", palette.paint(glyph, ansi::CYAN), palette.bold(title));
                depth += 1;
            }
            TraceEvent::ExitRule => depth = depth.saturating_sub(1).max(1),
            TraceEvent::Condition { check, tags, passed } => {
                let outcome = if *passed {
                    palette.paint("✓", ansi::GREEN)
                } else {
                    palette.dim("✗")
                };
                println!(
                    "{indent}{} {} [{}] {}",
                    palette.paint("?", ansi::YELLOW),
                    check,
                    tags.join(", "),
                    outcome,
                );
            }
            TraceEvent::Anchor { side, candidates, resolved } => {
                let target = match resolved {
                    Some(tag) => palette.paint(&tag.name, ansi::GREEN),
                    None => palette.dim("none"),
                };
                println!(
                    "{indent}{} {} [{}] {} {}",
                    palette.paint("@", ansi::BLUE),
                    side.label(),
                    candidates.join(", "),
                    palette.dim("→"),
                    target,
                );
            }
            TraceEvent::Mutation { op, tags } => {
                let glyph = match op {
                    MutationOp::Add | MutationOp::AddNegative => "+",
                    MutationOp::Remove | MutationOp::RemoveNegative => "-",
                    MutationOp::Tmp => "~",
                    MutationOp::Swap | MutationOp::SwapNegative => "=",
                };
                println!(
                    "{indent}{} {} [{}]",
                    palette.paint(glyph, ansi::GREEN),
                    op.label(),
                    tags.join(", "),
                );
            }
            TraceEvent::DefaultSelected { index } => {
                println!(
                    "{indent}{} {}",
                    palette.paint("→", ansi::CYAN),
                    palette.dim(format!("falling through to default [{index}]")),
                );
            }
            TraceEvent::Skipped { reason } => {
                println!("{indent}{}", palette.dim(format!("✗ skipped: {reason}")));
            }
        }
    }
}
