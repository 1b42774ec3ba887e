use std::path::PathBuf;

use clap::Parser;
use codesnake::{Block, CodeWidth, Label, LineIndex};
use sigil::{
    compiler,
    reader::{self, ReaderError, Span, Token},
    Config, Error, Interpreter, World,
};
use tracing_subscriber::EnvFilter;
use yansi::Paint;

#[derive(Parser, Debug)]
#[command(version, about = "Run sigil scripts, or read lines interactively")]
struct Args {
    /// script to run instead of starting the prompt
    script: Option<PathBuf>,
    /// print the disassembled translation before running
    #[arg(long)]
    dump: bool,
    /// print the tokens of every input
    #[arg(long)]
    tokens: bool,
    /// compile every block afresh
    #[arg(long)]
    no_cache: bool,
    #[arg(long, default_value_t = Config::default().memo_capacity)]
    memo_capacity: usize,
    #[arg(long, default_value_t = Config::default().max_call_depth)]
    max_call_depth: usize,
}

fn make_block<'a>(
    idx: &'a LineIndex,
    labels: impl IntoIterator<Item = (Span, Result<Token, ReaderError>)>,
) -> Option<Block<&'a str, String>> {
    Block::new(
        idx,
        labels.into_iter().map(|(range, tok)| {
            let text = match &tok {
                Ok(tok) => format!("{tok:?}").green().to_string(),
                Err(err) => err.to_string().red().to_string(),
            };
            Label::new(range).with_text(text).with_style(move |s| match tok {
                Ok(Token::Word(_) | Token::Path(_)) => s.blue().to_string(),
                Ok(Token::Label(_) | Token::PathLabel(_) | Token::AttributeLabel(_)) => {
                    s.magenta().to_string()
                }
                Ok(Token::Integer(_) | Token::Floating(_)) => s.yellow().to_string(),
                Ok(Token::String(_)) => s.cyan().to_string(),
                Ok(_) => s,
                Err(_) => s.red().to_string(),
            })
        }),
    )
}

fn print_block(block: Option<Block<&str, String>>, name: &str) {
    if let Some(block) = block.map(|blk| blk.map_code(|c| CodeWidth::new(c, c.len()))) {
        println!("{}[{name}]", block.prologue());
        print!("{block}");
        println!("{}", block.epilogue());
    }
}

/// Every token of `src`, one snippet per line
fn show_tokens(src: &str, name: &str) {
    let idx = LineIndex::new(src);
    let mut line_labels = vec![];
    for (token, span) in Token::lexer(src).spanned() {
        match token {
            Ok(Token::LineEnding) => print_block(make_block(&idx, line_labels.drain(..)), name),
            Ok(Token::Whitespace) => {}
            tok => line_labels.push((span, tok)),
        }
    }
    if !line_labels.is_empty() {
        print_block(make_block(&idx, line_labels.drain(..)), name);
    }
}

fn report(src: &str, name: &str, err: &Error) {
    eprintln!("{}", err.red());
    if let Error::Syntax(_) = err {
        // point at whatever the lexer refused
        let idx = LineIndex::new(src);
        let bad = Token::lexer(src)
            .spanned()
            .filter(|(token, _)| token.is_err())
            .map(|(token, span)| (span, token))
            .collect::<Vec<_>>();
        if !bad.is_empty() {
            print_block(make_block(&idx, bad), name);
        }
    }
}

fn eval(interp: &mut Interpreter, args: &Args, src: &str, name: &str) -> Result<(), Error> {
    if args.tokens {
        show_tokens(src, name);
    }
    let block = reader::read(interp.world_mut(), src)?;
    if args.dump {
        let translation = compiler::translate(interp.world_mut(), &block)?;
        print!("{}", translation.disassemble(interp.world().rodeo()));
    }
    interp.run(&block)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sigil=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let world = World::new(Config {
        cache_translations: !args.no_cache,
        memo_capacity: args.memo_capacity,
        max_call_depth: args.max_call_depth,
    });
    let mut interp = Interpreter::new(world);

    if let Some(path) = &args.script {
        let src = std::fs::read_to_string(path)?;
        let name = path.display().to_string();
        if let Err(err) = eval(&mut interp, &args, &src, &name) {
            report(&src, &name, &err);
            std::process::exit(1);
        }
        return Ok(());
    }

    let mut readline = rustyline::DefaultEditor::new()?;
    while let Ok(input) = readline.readline(">> ") {
        let src = input.as_str();
        if src.trim().is_empty() {
            continue;
        }
        _ = readline.add_history_entry(src);

        match eval(&mut interp, &args, src, "repl") {
            Ok(()) => {
                for value in interp.stack() {
                    println!("{} {}", "=".dim(), value.display(interp.world().rodeo()));
                }
                interp.clear_stack();
            }
            Err(err) => report(src, "repl", &err),
        }
    }

    Ok(())
}
