//! Minimal CLI surface — spec §6.4: `-c <script>`, or the whole of stdin
//! if `-c` is absent. No other flags; argv parsing is done by hand since
//! pulling in `clap` for two forms is out of scope for the core.

use std::io::{Read, Write};

use bashbox::{Session, SessionConfig};

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let script = if let Some(idx) = args.iter().position(|a| a == "-c") {
        match args.get(idx + 1) {
            Some(s) => s.clone(),
            None => {
                eprintln!("bashbox: -c requires an argument");
                std::process::exit(2);
            }
        }
    } else {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).expect("read stdin");
        buf
    };

    let mut config = SessionConfig::new();
    for (key, value) in std::env::vars() {
        config.env.insert(key, value);
    }

    let mut session = Session::new(config).expect("construct session");
    let result = session.run(&script).unwrap_or_else(|e| {
        eprintln!("bashbox: {e}");
        std::process::exit(e.exit_code());
    });

    print!("{}", result.stdout);
    eprint!("{}", result.stderr);
    std::io::stdout().flush().ok();
    std::io::stderr().flush().ok();
    std::process::exit(result.exit_code);
}
