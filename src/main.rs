use std::fs;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand};
use colored::Colorize;
use hotwatch::notify::Event;
use hotwatch::{
    blocking::{Flow, Hotwatch},
    EventKind,
};
use miette::{bail, IntoDiagnostic, Result};

use lodestone::output::Output;
use lodestone::{CodegenOptions, Datapack, RunOptions};

/// Lodestone compiles register-machine programs into Minecraft functions.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a `.eir` file to run
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Compile and run `.eir` file in the command simulator
    Run {
        /// `.eir` file to run
        name: PathBuf,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
        /// Print memory records after the run
        #[arg(long)]
        memory: bool,
        /// Give up after this many commands
        #[arg(long, default_value_t = RunOptions::default().max_commands)]
        max_commands: u64,
        #[command(flatten)]
        codegen: CodegenArgs,
    },
    /// Generate functions as a single listing or a datapack
    Compile {
        /// `.eir` file to compile
        name: PathBuf,
        /// Destination listing file or datapack directory
        dest: Option<PathBuf>,
        /// Write a datapack directory instead of a listing
        #[arg(short, long)]
        datapack: bool,
        #[command(flatten)]
        codegen: CodegenArgs,
    },
    /// Check a `.eir` file without writing any output
    Check {
        /// File to check
        name: PathBuf,
        #[command(flatten)]
        codegen: CodegenArgs,
    },
    /// Place a watch on a `.eir` file to receive constant checker updates
    Watch {
        /// `.eir` file to watch
        name: PathBuf,
    },
}

#[derive(ClapArgs, Clone, Copy)]
struct CodegenArgs {
    /// Instructions per generated function
    #[arg(long, default_value_t = CodegenOptions::default().chunk_size)]
    chunk_size: usize,
    /// Machine word width in bits
    #[arg(long, default_value_t = CodegenOptions::default().word_bits)]
    word_bits: u32,
    /// Write initial memory as a single pre-hashed literal
    #[arg(long)]
    literal_data: bool,
}

impl From<CodegenArgs> for CodegenOptions {
    fn from(args: CodegenArgs) -> Self {
        CodegenOptions {
            chunk_size: args.chunk_size,
            word_bits: args.word_bits,
            literal_data: args.literal_data,
        }
    }
}

impl Default for CodegenArgs {
    fn default() -> Self {
        let opts = CodegenOptions::default();
        CodegenArgs {
            chunk_size: opts.chunk_size,
            word_bits: opts.word_bits,
            literal_data: opts.literal_data,
        }
    }
}

fn main() -> miette::Result<()> {
    use MsgColor::*;
    let args = Args::parse();
    lodestone::env::init();
    env_logger::init();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(lodestone::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    if let Some(command) = args.command {
        match command {
            Command::Run {
                name,
                minimal,
                memory,
                max_commands,
                codegen,
            } => {
                let opts = RunOptions {
                    max_commands,
                    trace: lodestone::env::is_trace_enabled(),
                };
                run(&name, codegen.into(), opts, minimal, memory)
            }
            Command::Compile {
                name,
                dest,
                datapack,
                codegen,
            } => {
                file_message(Green, "Compiling", &name);
                let pack = compile(&name, codegen.into())?;
                message(
                    Green,
                    "Finished",
                    &format!(
                        "{} functions, {} commands",
                        pack.len(),
                        pack.command_count()
                    ),
                );

                if datapack {
                    let dest = dest.unwrap_or_else(|| name.with_extension(""));
                    if dest.exists() && !dest.is_dir() {
                        bail!("Destination `{}` is not a directory", dest.display());
                    }
                    pack.write_to(&dest).into_diagnostic()?;
                    file_message(Green, "Saved", &dest);
                } else {
                    let dest = dest.unwrap_or_else(|| name.with_extension("mcfunction"));
                    fs::write(&dest, pack.render_listing()).into_diagnostic()?;
                    file_message(Green, "Saved", &dest);
                }
                Ok(())
            }
            Command::Check { name, codegen } => {
                file_message(Green, "Checking", &name);
                let _ = compile(&name, codegen.into())?;
                message(Green, "Success", "no errors found!");
                Ok(())
            }
            Command::Watch { name } => {
                if !name.exists() {
                    bail!("File does not exist. Exiting...")
                }
                // Vim breaks if watching a single file
                let folder_path = match name.parent() {
                    Some(pth) if pth.is_dir() => pth.to_path_buf(),
                    _ => Path::new(".").to_path_buf(),
                };

                // Clear screen and move cursor to top left
                print!("\x1B[2J\x1B[2;1H");
                file_message(Green, "Watching", &name);
                message(Cyan, "Help", "press CTRL+C to exit");

                let mut watcher = Hotwatch::new_with_custom_delay(Duration::from_millis(500))
                    .into_diagnostic()?;

                watcher
                    .watch(folder_path, move |event: Event| match event.kind {
                        // Watch remove for vim changes
                        EventKind::Modify(_) | EventKind::Remove(_) => {
                            print!("\x1B[2J\x1B[2;1H");
                            file_message(Green, "Watching", &name);
                            message(Green, "Re-checking", "file change detected");
                            message(Cyan, "Help", "press CTRL+C to exit");

                            sleep(Duration::from_millis(50));

                            match compile(&name, CodegenOptions::default()) {
                                Ok(pack) => message(
                                    Green,
                                    "Success",
                                    &format!("{} commands generated", pack.command_count()),
                                ),
                                Err(e) => println!("\n{:?}", e),
                            }
                            Flow::Continue
                        }
                        _ => Flow::Continue,
                    })
                    .into_diagnostic()?;
                watcher.run();
                Ok(())
            }
        }
    } else if let Some(path) = args.path {
        let opts = RunOptions {
            trace: lodestone::env::is_trace_enabled(),
            ..Default::default()
        };
        run(&path, CodegenArgs::default().into(), opts, false, false)
    } else {
        println!("\n~ lodestone v{VERSION} ~");
        println!("{}", LOGO.truecolor(168, 119, 90).bold());
        println!("{SHORT_INFO}");
        std::process::exit(0);
    }
}

#[allow(unused)]
enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

fn message(color: MsgColor, left: &str, right: &str) {
    if Output::is_minimal() {
        return;
    }
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

fn run(
    name: &Path,
    codegen: CodegenOptions,
    opts: RunOptions,
    minimal: bool,
    memory: bool,
) -> Result<()> {
    Output::set_minimal(minimal);
    file_message(MsgColor::Green, "Compiling", name);
    let pack = compile(name, codegen)?;

    message(MsgColor::Green, "Running", "generated functions");
    let state = lodestone::runtime::run(&pack, opts)?;

    let out = Output::Normal;
    out.print_registers(&state);
    if memory {
        match state.memory() {
            Some(table) => out.print_memory(&table),
            None => bail!("Emulated memory is malformed after the run"),
        }
    }

    if state.halted() {
        message(
            MsgColor::Green,
            "Halted",
            &format!("after {} commands", state.commands_executed()),
        );
    } else {
        message(
            MsgColor::Red,
            "Stopped",
            &format!("program ended without `exit` at pc {}", state.pc()),
        );
    }
    file_message(MsgColor::Green, "Completed", name);
    Ok(())
}

/// Parse and generate a source file.
fn compile(name: &Path, opts: CodegenOptions) -> Result<Datapack> {
    match name.extension().and_then(|ext| ext.to_str()) {
        Some("eir") => {}
        Some(_) => bail!("File has unknown extension. Exiting..."),
        None => bail!("File has no extension. Exiting..."),
    }
    let src = fs::read_to_string(name).into_diagnostic()?;
    let module = lodestone::parse(&src)?;
    lodestone::generate(&module, opts)
}

const LOGO: &str = r#"
 _           _           _
| | ___   __| | ___  ___| |_ ___  _ __   ___
| |/ _ \ / _` |/ _ \/ __| __/ _ \| '_ \ / _ \
| | (_) | (_| |  __/\__ \ || (_) | | | |  __/
|_|\___/ \__,_|\___||___/\__\___/|_| |_|\___|"#;

const SHORT_INFO: &str = r"
Welcome to lodestone, a code generator that turns register-machine programs
into Minecraft functions, with a simulator to run them without a server.
Please use `-h` or `--help` to access the usage instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
