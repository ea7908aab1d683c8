//! Errors of the capture driver, chaining the library's.

error_chain! {
    links {
        Covinfo(::covinfo::Error, ::covinfo::ErrorKind);
    }

    foreign_links {
        Io(::std::io::Error);
    }
}
