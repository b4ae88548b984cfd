use icnsutil::IconFamily;
use std::env;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();
    let (verbose, paths) = match args.get(1).map(String::as_str) {
        Some("-v") => (true, &args[2..]),
        _ => (false, &args[1..]),
    };
    if paths.is_empty() {
        println!("Usage: icnsinfo [-v] <path>...");
        return;
    }
    let mut invalid = false;
    for path in paths {
        println!("File: {}", path);
        let text = IconFamily::describe_file(path, verbose, 2)
            .expect("failed to read ICNS file");
        print!("{}", text);
        let issues = IconFamily::verify_file(path).expect("failed to read ICNS file");
        if issues.is_empty() {
            println!("  OK");
        }
        for issue in issues {
            invalid = true;
            println!("  ! {}", issue);
        }
    }
    if invalid {
        process::exit(1);
    }
}
