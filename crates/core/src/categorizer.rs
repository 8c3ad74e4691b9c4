use crate::models::{is_identifier, FileKind, ImportType};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

/// Python standard library top-level modules (CPython 3.x, all platforms)
const PYTHON_STDLIB: &[&str] = &[
    // Core
    "abc", "aifc", "argparse", "array", "ast", "asynchat", "asyncio",
    "asyncore", "atexit", "audioop", "base64", "bdb", "binascii",
    "binhex", "bisect", "builtins", "bz2",
    // C
    "calendar", "cgi", "cgitb", "chunk", "cmath", "cmd", "code",
    "codecs", "codeop", "collections", "colorsys", "compileall",
    "concurrent", "configparser", "contextlib", "contextvars", "copy",
    "copyreg", "cProfile", "crypt", "csv", "ctypes", "curses",
    // D-E
    "dataclasses", "datetime", "dbm", "decimal", "difflib", "dis",
    "distutils", "doctest", "email", "encodings", "ensurepip", "enum",
    "errno",
    // F-G
    "faulthandler", "fcntl", "filecmp", "fileinput", "fnmatch",
    "formatter", "fractions", "ftplib", "functools", "gc", "genericpath",
    "getopt", "getpass", "gettext", "glob", "graphlib", "grp", "gzip",
    // H-I
    "hashlib", "heapq", "hmac", "html", "http", "idlelib", "imaplib",
    "imghdr", "imp", "importlib", "inspect", "io", "ipaddress",
    "itertools",
    // J-L
    "json", "keyword", "lib2to3", "linecache", "locale", "logging",
    "lzma",
    // M-N
    "mailbox", "mailcap", "marshal", "math", "mimetypes", "mmap",
    "modulefinder", "msilib", "msvcrt", "multiprocessing", "netrc", "nis",
    "nntplib", "ntpath", "nturl2path", "numbers",
    // O-P
    "opcode", "operator", "optparse", "os", "ossaudiodev", "parser",
    "pathlib", "pdb", "pickle", "pickletools", "pipes", "pkgutil",
    "platform", "plistlib", "poplib", "posix", "posixpath", "pprint",
    "profile", "pstats", "pty", "pwd", "py_compile", "pyclbr", "pydoc",
    "pydoc_data", "pyexpat",
    // Q-R
    "queue", "quopri", "random", "re", "readline", "reprlib",
    "resource", "rlcompleter", "runpy",
    // S
    "sched", "secrets", "select", "selectors", "shelve", "shlex",
    "shutil", "signal", "site", "smtpd", "smtplib", "sndhdr",
    "socket", "socketserver", "spwd", "sqlite3", "sre_compile",
    "sre_constants", "sre_parse", "ssl", "stat", "statistics", "string",
    "stringprep", "struct", "subprocess", "sunau", "symtable", "sys",
    "sysconfig", "syslog",
    // T
    "tabnanny", "tarfile", "telnetlib", "tempfile", "termios", "test",
    "textwrap", "this", "threading", "time", "timeit", "tkinter", "token",
    "tokenize", "tomllib", "trace", "traceback", "tracemalloc", "tty",
    "turtle", "turtledemo", "types", "typing",
    // U-Z
    "unicodedata", "unittest", "urllib", "uu", "uuid", "venv",
    "warnings", "wave", "weakref", "webbrowser", "winreg", "winsound",
    "wsgiref", "xdrlib", "xml", "xmlrpc", "zipapp", "zipfile",
    "zipimport", "zlib", "zoneinfo",
    // Underscore prefixed (internal but commonly used)
    "_thread", "__future__", "__main__", "_abc", "_ast", "_collections_abc",
    "_io", "_socket", "_ssl", "_weakref", "_winapi",
];

/// Returns true for standard-library module names
pub fn is_stdlib(module: &str) -> bool {
    PYTHON_STDLIB.contains(&module)
}

/// Categorizes top-level import names as stdlib, first-party or third-party
pub struct ImportCategorizer {
    /// Python stdlib modules
    python_stdlib: HashSet<&'static str>,
    /// Modules and packages that live inside the scanned project
    first_party: HashSet<String>,
}

impl ImportCategorizer {
    /// Create a categorizer with an explicit set of first-party names
    pub fn new<I, S>(first_party: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            python_stdlib: PYTHON_STDLIB.iter().copied().collect(),
            first_party: first_party.into_iter().map(Into::into).collect(),
        }
    }

    /// Derive first-party names from the files found under the project
    /// root: script stems, package directories (holding `__init__.py`) and
    /// top-level directories.
    pub fn from_project(root: &Path, files: &[(PathBuf, FileKind)]) -> Self {
        let mut names = BTreeSet::new();

        for (path, kind) in files {
            let relative = path.strip_prefix(root).unwrap_or(path);

            if *kind == FileKind::Script {
                if let Some(stem) = relative.file_stem().map(|s| s.to_string_lossy()) {
                    if stem == "__init__" {
                        if let Some(dir) = relative.parent().and_then(|p| p.file_name()) {
                            names.insert(dir.to_string_lossy().into_owned());
                        }
                    } else {
                        names.insert(stem.into_owned());
                    }
                }
            }

            let mut components = relative.components();
            if let (Some(first), Some(_)) = (components.next(), components.next()) {
                names.insert(first.as_os_str().to_string_lossy().into_owned());
            }
        }

        names.retain(|name| is_identifier(name));
        Self::new(names)
    }

    /// Categorize a top-level module name
    pub fn categorize(&self, module: &str) -> ImportType {
        if self.python_stdlib.contains(module) {
            return ImportType::Stdlib;
        }

        if self.first_party.contains(module) {
            return ImportType::FirstParty;
        }

        ImportType::ThirdParty
    }

    /// Get the list of first-party names, sorted
    pub fn first_party_modules(&self) -> Vec<String> {
        let mut names: Vec<String> = self.first_party.iter().cloned().collect();
        names.sort();
        names
    }
}
