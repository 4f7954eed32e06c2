pub mod multitype_tree;
