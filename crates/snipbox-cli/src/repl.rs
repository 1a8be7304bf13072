//! Interactive session backed by the persistent namespace.

use std::io::{self, BufRead};
use std::time::Duration;

use snipbox_core::{ExecuteOptions, Sandbox};

use crate::colors::{self, Style, paint};
use crate::run::print_result;

const PROMPT: &str = ">>> ";
const CONTINUATION: &str = "... ";

/// Run the read-execute-print loop until `:quit` or end of input.
pub fn execute(sandbox: &Sandbox, timeout: u64) -> anyhow::Result<()> {
    let options = ExecuteOptions::persistent().with_timeout(Duration::from_secs(timeout));

    println!(
        "{} {} ({})",
        paint(Style::Bold, "snipbox"),
        env!("CARGO_PKG_VERSION"),
        sandbox.policy().interpreter().version()
    );
    println!(
        "{}",
        paint(Style::Dim, "Bindings persist between snippets. :vars, :reset, :quit")
    );

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        prompt(PROMPT);
        let Some(line) = lines.next() else { break };
        let line = line?;

        match line.trim() {
            "" => continue,
            ":quit" | ":q" | ":exit" => break,
            ":reset" => {
                sandbox.reset_namespace();
                println!("{}", paint(Style::Dim, "namespace cleared"));
                continue;
            }
            ":vars" => {
                print_vars(sandbox);
                continue;
            }
            _ => {}
        }

        // A block opener reads more lines until a blank one.
        let mut code = line;
        if code.trim_end().ends_with(':') {
            loop {
                prompt(CONTINUATION);
                match lines.next() {
                    Some(next) => {
                        let next = next?;
                        if next.trim().is_empty() {
                            break;
                        }
                        code.push('\n');
                        code.push_str(&next);
                    }
                    None => break,
                }
            }
        }

        let result = sandbox.execute(&code, options);
        print_result(&result);
    }

    println!();
    Ok(())
}

fn prompt(text: &str) {
    print!("{}", paint(Style::Prompt, text));
    colors::flush_stdout();
}

fn print_vars(sandbox: &Sandbox) {
    let namespace = sandbox.persistent_namespace();
    if namespace.is_empty() {
        println!("{}", paint(Style::Dim, "(empty)"));
        return;
    }

    for (name, value) in namespace.bindings() {
        println!("{} = {}", paint(Style::Bold, name), value.display());
    }
    for (alias, module) in namespace.modules() {
        println!(
            "{} {}",
            paint(Style::Bold, alias),
            paint(Style::Dim, format!("(module {})", module))
        );
    }
}
