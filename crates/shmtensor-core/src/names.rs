//! OS-level object names
//!
//! Every server owns nine named objects under one `(basename, namespace)`
//! pair: the data segment, six metadata cells, and two semaphores. The
//! rendered name is the rendezvous key between server and client, so the
//! format here is wire contract, not cosmetics.

/// Name builder for the shared objects of one tensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentPaths {
    basename: String,
    namespace: String,
}

impl SegmentPaths {
    pub fn new(basename: &str, namespace: &str) -> Self {
        SegmentPaths {
            basename: basename.to_string(),
            namespace: namespace.to_string(),
        }
    }

    pub fn basename(&self) -> &str {
        &self.basename
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn join(&self, suffix: &str) -> String {
        if self.namespace.is_empty() {
            format!("/{}_{}", self.basename, suffix)
        } else {
            format!("/{}_{}_{}", self.namespace, self.basename, suffix)
        }
    }

    pub fn data(&self) -> String {
        self.join("data")
    }

    pub fn n_rows(&self) -> String {
        self.join("nrows")
    }

    pub fn n_cols(&self) -> String {
        self.join("ncols")
    }

    pub fn clients(&self) -> String {
        self.join("clients")
    }

    pub fn dtype(&self) -> String {
        self.join("dtype")
    }

    pub fn is_running(&self) -> String {
        self.join("isrunning")
    }

    pub fn mem_layout(&self) -> String {
        self.join("memlayout")
    }

    pub fn server_sem(&self) -> String {
        self.join("serversem")
    }

    pub fn data_sem(&self) -> String {
        self.join("datasem")
    }

    /// Segment backing a named condition variable
    pub fn cond_var(&self) -> String {
        self.join("condvar")
    }

    /// All six metadata cell names, in sidecar order
    pub fn metadata(&self) -> [String; 6] {
        [
            self.n_rows(),
            self.n_cols(),
            self.clients(),
            self.dtype(),
            self.is_running(),
            self.mem_layout(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_carry_namespace_basename_suffix() {
        let p = SegmentPaths::new("MyTensor", "Sim");
        assert_eq!(p.data(), "/Sim_MyTensor_data");
        assert_eq!(p.n_rows(), "/Sim_MyTensor_nrows");
        assert_eq!(p.n_cols(), "/Sim_MyTensor_ncols");
        assert_eq!(p.clients(), "/Sim_MyTensor_clients");
        assert_eq!(p.dtype(), "/Sim_MyTensor_dtype");
        assert_eq!(p.is_running(), "/Sim_MyTensor_isrunning");
        assert_eq!(p.mem_layout(), "/Sim_MyTensor_memlayout");
        assert_eq!(p.server_sem(), "/Sim_MyTensor_serversem");
        assert_eq!(p.data_sem(), "/Sim_MyTensor_datasem");
    }

    #[test]
    fn empty_namespace_drops_the_separator() {
        let p = SegmentPaths::new("MyTensor", "");
        assert_eq!(p.data(), "/MyTensor_data");
    }
}
